//! Re-validates the session whenever another client touches it.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::policy::SecurityPolicy;
use super::store::{SessionStore, WATCHED_KEYS};

/// Background task watching the store's change feed. Changes to the watched
/// auth keys made by any other origin trigger an integrity check; a failed
/// check counts as a violation. Aborted on drop.
pub struct SessionMonitor {
    handle: JoinHandle<()>,
}

impl SessionMonitor {
    /// Subscribes before returning, so no change made after this call is missed.
    #[must_use]
    pub fn spawn(store: Arc<SessionStore>, policy: Arc<SecurityPolicy>) -> Self {
        let mut events = store.backend().watch();
        let own_origin = store.backend().origin();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if event.origin == own_origin || !WATCHED_KEYS.contains(&event.key.as_str())
                        {
                            continue;
                        }
                        warn!("security: external storage modification detected: {}", event.key);
                        check(&store, &policy);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("security: missed {skipped} storage events, re-checking");
                        check(&store, &policy);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("session monitor stopped");
        });

        Self { handle }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn check(store: &SessionStore, policy: &SecurityPolicy) {
    match store.has_auth_data() {
        // Another client logged out.
        Ok(false) => return,
        Ok(true) => {}
        Err(err) => {
            error!("security: session storage unavailable: {err}");
            return;
        }
    }

    match store.verify_integrity() {
        Ok(true) => debug!("security: external change passed integrity check"),
        Ok(false) => {
            policy.record_failure("storage tampering detected");
        }
        Err(err) => error!("security: session storage unavailable: {err}"),
    }
}
