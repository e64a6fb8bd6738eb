//! Runtime configuration shared by the session guard and the registration flow.

use std::time::Duration;
use url::Url;

use super::{retry::RetryPolicy, Error, Result};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:9091";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 3;
const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(15 * 60);
const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct GateConfig {
    api_base_url: Url,
    request_timeout: Duration,
    introspection_timeout: Duration,
    max_failed_attempts: u32,
    lockout_duration: Duration,
    registration_retry: RetryPolicy,
    watch_interval: Duration,
}

impl GateConfig {
    /// # Errors
    /// Returns an error if `api_base_url` is not an absolute http(s) URL.
    pub fn new(api_base_url: &str) -> Result<Self> {
        let url = Url::parse(api_base_url.trim())
            .map_err(|err| Error::Config(format!("invalid API base URL {api_base_url}: {err}")))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(Error::Config(format!(
                    "unsupported scheme {scheme} in API base URL"
                )))
            }
        }

        if url.host().is_none() {
            return Err(Error::Config(
                "API base URL has no host specified".to_string(),
            ));
        }

        Ok(Self {
            api_base_url: url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            introspection_timeout: DEFAULT_INTROSPECTION_TIMEOUT,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
            registration_retry: RetryPolicy::registration(),
            watch_interval: DEFAULT_WATCH_INTERVAL,
        })
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_introspection_timeout(mut self, timeout: Duration) -> Self {
        self.introspection_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: u32) -> Self {
        self.max_failed_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_lockout_duration(mut self, duration: Duration) -> Self {
        self.lockout_duration = duration;
        self
    }

    #[must_use]
    pub fn with_registration_retry(mut self, policy: RetryPolicy) -> Self {
        self.registration_retry = policy;
        self
    }

    #[must_use]
    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Joins `path` onto the configured base URL.
    ///
    /// # Errors
    /// Returns an error if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.api_base_url.as_str().trim_end_matches('/');
        let path = path.trim().trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|err| Error::Config(format!("invalid endpoint {path}: {err}")))
    }

    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn introspection_timeout(&self) -> Duration {
        self.introspection_timeout
    }

    #[must_use]
    pub fn max_failed_attempts(&self) -> u32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub fn lockout_duration(&self) -> Duration {
        self.lockout_duration
    }

    #[must_use]
    pub fn registration_retry(&self) -> RetryPolicy {
        self.registration_retry
    }

    #[must_use]
    pub fn watch_interval(&self) -> Duration {
        self.watch_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() -> Result<()> {
        let config = GateConfig::new(DEFAULT_API_BASE_URL)?;
        assert_eq!(config.max_failed_attempts(), 3);
        assert_eq!(config.lockout_duration(), Duration::from_secs(900));
        assert_eq!(config.introspection_timeout(), Duration::from_secs(10));
        assert_eq!(config.registration_retry().max_attempts(), 2);
        Ok(())
    }

    #[test]
    fn endpoint_joins_without_double_slash() -> Result<()> {
        let config = GateConfig::new("https://api.gemnet.lk/")?;
        let url = config.endpoint("/api/auth/validate-token")?;
        assert_eq!(url.as_str(), "https://api.gemnet.lk/api/auth/validate-token");
        Ok(())
    }

    #[test]
    fn endpoint_keeps_base_path() -> Result<()> {
        let config = GateConfig::new("https://gemnet.lk/backend")?;
        let url = config.endpoint("api/auth/login")?;
        assert_eq!(url.as_str(), "https://gemnet.lk/backend/api/auth/login");
        Ok(())
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let err = GateConfig::new("ftp://gemnet.lk").err();
        assert!(err.is_some_and(|e| e.to_string().contains("unsupported scheme")));
    }

    #[test]
    fn rejects_garbage() {
        assert!(GateConfig::new("not a url").is_err());
    }

    #[test]
    fn max_failed_attempts_never_zero() -> Result<()> {
        let config = GateConfig::new(DEFAULT_API_BASE_URL)?.with_max_failed_attempts(0);
        assert_eq!(config.max_failed_attempts(), 1);
        Ok(())
    }
}
