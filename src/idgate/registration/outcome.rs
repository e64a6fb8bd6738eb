//! Structured result of the NIC document check.
//!
//! The NIC step is the one place where failures are classified for the caller,
//! because the remedy differs per cause: retake the photo, re-enter the NIC
//! number or contact support.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::idgate::client::ApiResponse;

pub const NETWORK_ERROR_MESSAGE: &str =
    "Unable to connect to the server. Please check your internet connection and try again.";
const TECHNICAL_ISSUE_MESSAGE: &str =
    "We encountered a technical issue while processing your verification.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NicErrorKind {
    PoorImageQuality,
    NicNumberMismatch,
    FaceMismatch,
    MissingFaceImage,
    SystemError,
    UserNotFound,
}

impl NicErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PoorImageQuality => "POOR_IMAGE_QUALITY",
            Self::NicNumberMismatch => "NIC_NUMBER_MISMATCH",
            Self::FaceMismatch => "FACE_MISMATCH",
            Self::MissingFaceImage => "MISSING_FACE_IMAGE",
            Self::SystemError => "SYSTEM_ERROR",
            Self::UserNotFound => "USER_NOT_FOUND",
        }
    }

    /// Fallback remediation when the server sends none.
    #[must_use]
    pub fn default_suggestions(self) -> Vec<String> {
        let suggestions: &[&str] = match self {
            Self::PoorImageQuality => &[
                "Retake the photo in good lighting",
                "Make sure all four corners of the NIC are visible",
                "Use a JPG or PNG image under 10 MB",
            ],
            Self::NicNumberMismatch => &[
                "Check that the NIC number you entered matches your card",
                "Upload a photo of your own NIC",
            ],
            Self::FaceMismatch => &[
                "Upload the NIC that belongs to you",
                "Retake your face photo facing the camera directly",
            ],
            Self::MissingFaceImage => &["Complete face verification before uploading your NIC"],
            Self::UserNotFound => &[
                "Start the registration again",
                "Contact support if the problem persists",
            ],
            Self::SystemError => &[
                "Check your internet connection and try again",
                "Try using a different image format (JPG or PNG)",
                "Contact support if the problem persists",
            ],
        };
        suggestions.iter().map(|s| (*s).to_string()).collect()
    }
}

impl fmt::Display for NicErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NicErrorKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "POOR_IMAGE_QUALITY" => Ok(Self::PoorImageQuality),
            "NIC_NUMBER_MISMATCH" => Ok(Self::NicNumberMismatch),
            "FACE_MISMATCH" => Ok(Self::FaceMismatch),
            "MISSING_FACE_IMAGE" => Ok(Self::MissingFaceImage),
            "SYSTEM_ERROR" => Ok(Self::SystemError),
            "USER_NOT_FOUND" => Ok(Self::UserNotFound),
            other => Err(format!("unknown NIC error kind: {other}")),
        }
    }
}

impl Serialize for NicErrorKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// `data` of the verify-nic response. Every field is optional on the wire.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NicVerificationData {
    pub extracted_nic_number: Option<String>,
    pub error: Option<String>,
    pub user_message: Option<String>,
    pub suggestions: Option<Vec<String>>,
    pub verification_status: Option<String>,
    pub technical_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NicErrorKind>,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_nic_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_error: Option<String>,
}

impl VerificationOutcome {
    /// Maps a parsed server response. On failure an unknown or missing error
    /// kind becomes [`NicErrorKind::SystemError`] and missing suggestions are
    /// filled from [`NicErrorKind::default_suggestions`].
    #[must_use]
    pub fn from_response(response: ApiResponse<NicVerificationData>) -> Self {
        let data = response.data.unwrap_or_default();

        if response.success {
            return Self {
                success: true,
                message: response.message,
                error: None,
                suggestions: Vec::new(),
                extracted_nic_number: data.extracted_nic_number,
                verification_status: data.verification_status,
                technical_error: None,
            };
        }

        let kind = data
            .error
            .as_deref()
            .and_then(|kind| kind.parse().ok())
            .unwrap_or(NicErrorKind::SystemError);
        let suggestions = data
            .suggestions
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| kind.default_suggestions());
        let message = data
            .user_message
            .filter(|m| !m.trim().is_empty())
            .or_else(|| Some(response.message).filter(|m| !m.trim().is_empty()))
            .unwrap_or_else(|| TECHNICAL_ISSUE_MESSAGE.to_string());

        Self {
            success: false,
            message,
            error: Some(kind),
            suggestions,
            extracted_nic_number: data.extracted_nic_number,
            verification_status: data.verification_status,
            technical_error: data.technical_error,
        }
    }

    /// The server could not be reached or answered with something unreadable.
    #[must_use]
    pub fn system_error(technical_error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: NETWORK_ERROR_MESSAGE.to_string(),
            error: Some(NicErrorKind::SystemError),
            suggestions: NicErrorKind::SystemError.default_suggestions(),
            extracted_nic_number: None,
            verification_status: None,
            technical_error: Some(technical_error.into()),
        }
    }

    /// The image failed the local checks and was never uploaded.
    #[must_use]
    pub fn poor_image_quality(problem: impl Into<String>) -> Self {
        Self {
            success: false,
            message: problem.into(),
            error: Some(NicErrorKind::PoorImageQuality),
            suggestions: NicErrorKind::PoorImageQuality.default_suggestions(),
            extracted_nic_number: None,
            verification_status: None,
            technical_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> VerificationOutcome {
        let response: ApiResponse<NicVerificationData> =
            serde_json::from_value(value).unwrap_or_else(|err| panic!("bad fixture: {err}"));
        VerificationOutcome::from_response(response)
    }

    #[test]
    fn every_kind_has_default_suggestions() {
        for kind in [
            NicErrorKind::PoorImageQuality,
            NicErrorKind::NicNumberMismatch,
            NicErrorKind::FaceMismatch,
            NicErrorKind::MissingFaceImage,
            NicErrorKind::SystemError,
            NicErrorKind::UserNotFound,
        ] {
            assert!(!kind.default_suggestions().is_empty(), "{kind}");
            assert_eq!(kind.as_str().parse::<NicErrorKind>(), Ok(kind));
        }
    }

    #[test]
    fn carries_server_fields_on_mismatch() {
        let outcome = parse(json!({
            "success": false,
            "message": "NIC verification failed",
            "data": {
                "error": "NIC_NUMBER_MISMATCH",
                "userMessage": "The NIC number on the card does not match.",
                "suggestions": ["Re-enter your NIC number"],
                "extractedNicNumber": "901031234V"
            }
        }));
        assert_eq!(outcome.error, Some(NicErrorKind::NicNumberMismatch));
        assert_eq!(outcome.message, "The NIC number on the card does not match.");
        assert_eq!(outcome.suggestions, vec!["Re-enter your NIC number"]);
        assert_eq!(outcome.extracted_nic_number.as_deref(), Some("901031234V"));
    }

    #[test]
    fn unknown_kind_is_system_error_with_defaults() {
        let outcome = parse(json!({
            "success": false,
            "message": "",
            "data": { "error": "QUANTUM_FLUX" }
        }));
        assert_eq!(outcome.error, Some(NicErrorKind::SystemError));
        assert_eq!(outcome.message, TECHNICAL_ISSUE_MESSAGE);
        assert!(!outcome.suggestions.is_empty());
    }

    #[test]
    fn missing_data_is_system_error() {
        let outcome = parse(json!({ "success": false, "message": "NIC verification failed" }));
        assert_eq!(outcome.error, Some(NicErrorKind::SystemError));
        assert_eq!(outcome.message, "NIC verification failed");
    }

    #[test]
    fn success_has_no_error() {
        let outcome = parse(json!({
            "success": true,
            "message": "Verified",
            "data": { "verificationStatus": "VERIFIED" }
        }));
        assert!(outcome.success);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.verification_status.as_deref(), Some("VERIFIED"));
    }
}
