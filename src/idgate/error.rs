use thiserror::Error;

use super::store::StoreError;

/// Maximum number of server error body characters surfaced to the user.
const MAX_ERROR_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("response error: {0}")]
    Parse(String),
    #[error("request error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("{0}")]
    Rejected(String),
    #[error("transition not allowed: {0}")]
    Transition(String),
}

impl Error {
    /// Timeouts are the only transient class; everything else is final.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Message suitable for showing next to the form that failed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected(message) | Self::InvalidInput(message) | Self::InvalidImage(message) => {
                message.clone()
            }
            Self::Timeout(_) => {
                "The request is taking longer than expected. Please try again.".to_string()
            }
            Self::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout("request timed out".to_string())
        } else if err.is_decode() {
            Self::Parse(format!("failed to decode response: {err}"))
        } else if err.is_builder() {
            Self::Serialization(format!("failed to build request: {err}"))
        } else {
            Self::Network(format!("unable to reach the server: {err}"))
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Trims and truncates server error bodies before they reach the user.
pub(crate) fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Request failed.".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_body_defaults_when_empty() {
        assert_eq!(sanitize_body("   "), "Request failed.");
    }

    #[test]
    fn sanitize_body_truncates() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_body(&long).len(), MAX_ERROR_CHARS);
    }

    #[test]
    fn only_timeouts_are_transient() {
        assert!(Error::Timeout("slow".into()).is_timeout());
        assert!(!Error::Network("down".into()).is_timeout());
        assert!(!Error::Rejected("Email already exists".into()).is_timeout());
    }

    #[test]
    fn user_message_prefers_server_text() {
        let err = Error::Rejected("Email already registered".into());
        assert_eq!(err.user_message(), "Email already registered");
        let err = Error::Http {
            status: 400,
            message: "NIC number is required".into(),
        };
        assert_eq!(err.user_message(), "NIC number is required");
    }
}
