//! Progressive lockout after repeated security violations.
//!
//! The counters live in one owned [`SecurityPolicy`] behind a mutex, so
//! concurrent validations cannot lose an update and independent policies can
//! coexist in the same process (one per test, for instance).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::store::SessionStore;

/// Where the caller should send the user after a forced logout.
pub const SECURITY_REDIRECT: &str = "/login?security=violation";

const EVENT_CAPACITY: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecurityEvent {
    ForcedLogout { reason: String, redirect: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SecurityState {
    pub failed_attempts: u32,
    pub last_failure: Option<Instant>,
    pub locked: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still below the threshold.
    Counted { attempts: u32 },
    /// The threshold was reached; storage was erased and a forced logout sent.
    Locked,
}

pub struct SecurityPolicy {
    max_attempts: u32,
    lockout: Duration,
    store: Arc<SessionStore>,
    state: Mutex<SecurityState>,
    events: broadcast::Sender<SecurityEvent>,
}

impl SecurityPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, lockout: Duration, store: Arc<SessionStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            max_attempts: max_attempts.max(1),
            lockout,
            store,
            state: Mutex::new(SecurityState::default()),
            events,
        }
    }

    /// True while the lockout window is running. An expired lock is released
    /// here, which also resets the failure counter.
    pub fn is_locked(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.locked {
            return false;
        }

        let expired = match state.last_failure {
            Some(at) => at.elapsed() >= self.lockout,
            None => true,
        };
        if expired {
            *state = SecurityState::default();
            info!("security: lockout expired, validation re-enabled");
            return false;
        }

        true
    }

    /// Counts one violation. Reaching the threshold locks the policy, erases
    /// every stored auth key and broadcasts [`SecurityEvent::ForcedLogout`].
    pub fn record_failure(&self, reason: &str) -> FailureOutcome {
        let attempts = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.failed_attempts = state.failed_attempts.saturating_add(1);
            state.last_failure = Some(Instant::now());
            if state.failed_attempts >= self.max_attempts {
                state.locked = true;
            }
            state.failed_attempts
        };

        warn!(
            "security violation: {reason} (attempt {attempts}/{})",
            self.max_attempts
        );

        if attempts < self.max_attempts {
            return FailureOutcome::Counted { attempts };
        }

        error!(
            "security: maximum failed attempts reached, locking for {:?}",
            self.lockout
        );
        if let Err(err) = self.store.clear() {
            error!("security: failed to clear session storage on lockout: {err}");
        }
        // No subscribers is fine.
        let _ = self.events.send(SecurityEvent::ForcedLogout {
            reason: reason.to_string(),
            redirect: SECURITY_REDIRECT.to_string(),
        });

        FailureOutcome::Locked
    }

    /// Resets the failure counter. A running lock is left alone.
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failed_attempts = 0;
    }

    #[must_use]
    pub fn state(&self) -> SecurityState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SecurityEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }
}
