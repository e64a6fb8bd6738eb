//! Per-call-site retry policies.
//!
//! Each remote call picks its own [`RetryPolicy`] value instead of sharing a
//! helper, so a new call site never inherits another one's retry behaviour.
//! Token introspection fails closed and never retries; personal-info
//! registration retries timeouts once.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    retry_timeouts: bool,
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
            retry_timeouts: false,
        }
    }

    /// Two attempts total, timeouts only, fixed one second backoff.
    #[must_use]
    pub const fn registration() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(1),
            retry_timeouts: true,
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn backoff(&self) -> Duration {
        self.backoff
    }

    fn should_retry(&self, err: &Error, attempt: u32) -> bool {
        self.retry_timeouts && err.is_timeout() && attempt < self.max_attempts
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. The last error is returned.
    ///
    /// # Errors
    /// Returns the error of the final attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            debug!("{label}: attempt {attempt}/{}", self.max_attempts);
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, attempt) => {
                    warn!(
                        "{label}: timeout on attempt {attempt}/{}, retrying in {:?}",
                        self.max_attempts, self.backoff
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
