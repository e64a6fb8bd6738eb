//! The single authentication decision.
//!
//! Offline checks run first (token shape, profile, digest) so that the common
//! logged-out path stays free of side effects and no request is made for a
//! session that is already known to be bad. Only then is the token sent to the
//! backend for introspection, which fails closed and is never retried.

use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::client::{ApiClient, TokenIntrospector};
use super::policy::SecurityPolicy;
use super::profile::{Role, UserProfile};
use super::store::{Credential, SessionStore};
use super::{Error, Result};

pub struct AuthValidator<I> {
    introspector: I,
    store: Arc<SessionStore>,
    policy: Arc<SecurityPolicy>,
}

impl<I: TokenIntrospector> AuthValidator<I> {
    #[must_use]
    pub fn new(introspector: I, store: Arc<SessionStore>, policy: Arc<SecurityPolicy>) -> Self {
        Self {
            introspector,
            store,
            policy,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<SecurityPolicy> {
        &self.policy
    }

    /// True only when the stored session passes every check and the backend
    /// accepts the token.
    #[instrument(skip(self))]
    pub async fn validate_authentication(&self) -> bool {
        if self.policy.is_locked() {
            warn!("security: validation refused while locked");
            return false;
        }

        let session = match self.store.read() {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.clear_partial_session();
                debug!("security: no stored session");
                return false;
            }
            Err(err) => {
                error!("security: session storage unavailable: {err}");
                self.policy.record_failure("authentication validation error");
                return false;
            }
        };

        if let Err(err) = session.credential() {
            warn!("security: stored token rejected: {err}");
            self.policy.record_failure("invalid token format");
            return false;
        }

        let Some(record) = session.profile_record() else {
            self.policy.record_failure("invalid user data");
            return false;
        };
        if UserProfile::from_record(&record).is_none() {
            self.policy.record_failure("invalid profile");
            return false;
        }

        match self.store.verify_integrity() {
            Ok(true) => {}
            Ok(false) => {
                self.policy.record_failure("integrity digest mismatch");
                return false;
            }
            Err(err) => {
                error!("security: session storage unavailable: {err}");
                self.policy.record_failure("authentication validation error");
                return false;
            }
        }

        if let Err(err) = self.introspector.validate_token(&session.token).await {
            warn!("security: token introspection failed: {err}");
            self.policy.record_failure("server rejected token");
            return false;
        }

        self.policy.record_success();
        debug!("security: session validated");
        true
    }

    /// A token without a profile (or the reverse) is left behind when another
    /// client clears only part of the session. Remove the rest.
    fn clear_partial_session(&self) {
        match self.store.has_auth_data() {
            Ok(true) => {
                warn!("security: partial session found, clearing");
                self.clear_all_auth_data();
            }
            Ok(false) => {}
            Err(err) => error!("security: session storage unavailable: {err}"),
        }
    }

    /// Persists the token, profile and digest together. `false` when either
    /// input is invalid or storage fails; nothing is written in that case.
    pub fn secure_token_storage(&self, token: &str, profile: &UserProfile) -> bool {
        let credential = match Credential::from_token(token) {
            Ok(credential) => credential,
            Err(err) => {
                warn!("security: refusing to store token: {err}");
                return false;
            }
        };
        match self.store.write(&credential, profile) {
            Ok(stored) => stored,
            Err(err) => {
                error!("security: failed to store authentication data: {err}");
                false
            }
        }
    }

    pub fn clear_all_auth_data(&self) {
        if let Err(err) = self.store.clear() {
            error!("security: failed to clear authentication data: {err}");
        }
    }

    pub fn verify_integrity(&self) -> bool {
        self.store.verify_integrity().unwrap_or_else(|err| {
            error!("security: session storage unavailable: {err}");
            false
        })
    }

    pub fn logout(&self) {
        self.clear_all_auth_data();
        info!("logged out");
    }
}

impl AuthValidator<ApiClient> {
    /// Logs in and stores the session.
    ///
    /// # Errors
    /// Returns [`Error::Rejected`] when the backend refuses the credentials or
    /// answers with data that fails validation, or the transport error.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<UserProfile> {
        let data = self.introspector.login(email.trim(), password).await?;

        let role: Role = data
            .role
            .parse()
            .map_err(|err: String| Error::Rejected(format!("invalid authentication data: {err}")))?;
        let profile = UserProfile {
            user_id: data.user_id,
            email: data.email,
            first_name: data.first_name,
            last_name: data.last_name,
            role,
            is_verified: data.is_verified,
            verification_status: data.verification_status,
        };

        if profile.verification_status.as_deref() == Some("REJECTED") {
            warn!("account {} was rejected during verification", profile.user_id);
        }

        if !self.secure_token_storage(&data.token, &profile) {
            return Err(Error::Rejected(
                "Invalid authentication data received from server".to_string(),
            ));
        }

        info!("logged in as {}", profile.user_id);
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idgate::policy::FailureOutcome;
    use crate::idgate::profile::test_profiles::buyer;
    use crate::idgate::store::{
        KeyValueStore, MemoryStore, AUTH_TOKEN_KEY, LEGACY_AUTH_KEYS, USER_DATA_KEY,
    };
    use crate::idgate::token::test_tokens::token_for;
    use anyhow::Result;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    const LOCKOUT: Duration = Duration::from_secs(15 * 60);

    struct FakeIntrospector {
        accept: AtomicBool,
        calls: AtomicU32,
    }

    impl FakeIntrospector {
        fn accepting(accept: bool) -> Self {
            Self {
                accept: AtomicBool::new(accept),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl TokenIntrospector for FakeIntrospector {
        async fn validate_token(&self, _token: &SecretString) -> crate::idgate::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.accept.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(Error::Http {
                    status: 401,
                    message: "invalid token".to_string(),
                })
            }
        }
    }

    fn validator(accept: bool) -> (Arc<MemoryStore>, AuthValidator<FakeIntrospector>) {
        let backend = Arc::new(MemoryStore::new());
        let store = Arc::new(SessionStore::new(backend.clone()));
        let policy = Arc::new(SecurityPolicy::new(3, LOCKOUT, store.clone()));
        (
            backend,
            AuthValidator::new(FakeIntrospector::accepting(accept), store, policy),
        )
    }

    fn calls(validator: &AuthValidator<FakeIntrospector>) -> u32 {
        validator.introspector.calls.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn valid_session_passes() {
        let (_, validator) = validator(true);
        assert!(validator.secure_token_storage(&token_for("u-1", 3600), &buyer("u-1")));
        assert!(validator.validate_authentication().await);
        assert_eq!(calls(&validator), 1);
        assert_eq!(validator.policy().state().failed_attempts, 0);
    }

    #[tokio::test]
    async fn logged_out_is_not_a_violation() {
        let (_, validator) = validator(true);
        assert!(!validator.validate_authentication().await);
        assert_eq!(calls(&validator), 0);
        assert_eq!(validator.policy().state().failed_attempts, 0);
    }

    #[tokio::test]
    async fn partial_session_is_cleared_without_counting() -> Result<()> {
        let (backend, validator) = validator(true);
        assert!(validator.secure_token_storage(&token_for("u-1", 3600), &buyer("u-1")));
        backend.set(LEGACY_AUTH_KEYS[0], "stale")?;
        backend.remove(AUTH_TOKEN_KEY)?;

        assert!(!validator.validate_authentication().await);
        assert!(!validator.store().has_auth_data()?);
        assert_eq!(validator.policy().state().failed_attempts, 0);
        assert_eq!(calls(&validator), 0);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_token_is_counted_before_network() -> Result<()> {
        let (backend, validator) = validator(true);
        assert!(validator.secure_token_storage(&token_for("u-1", 3600), &buyer("u-1")));
        backend.set(AUTH_TOKEN_KEY, "only.two")?;

        assert!(!validator.validate_authentication().await);
        assert_eq!(validator.policy().state().failed_attempts, 1);
        assert_eq!(calls(&validator), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unparseable_profile_is_counted() -> Result<()> {
        let (backend, validator) = validator(true);
        assert!(validator.secure_token_storage(&token_for("u-1", 3600), &buyer("u-1")));
        backend.set(USER_DATA_KEY, "{not json")?;

        assert!(!validator.validate_authentication().await);
        assert_eq!(validator.policy().state().failed_attempts, 1);
        Ok(())
    }

    #[tokio::test]
    async fn tampered_role_is_counted() -> Result<()> {
        let (backend, validator) = validator(true);
        assert!(validator.secure_token_storage(&token_for("u-1", 3600), &buyer("u-1")));
        let user_data = backend.get(USER_DATA_KEY)?.unwrap_or_default();
        backend.set(USER_DATA_KEY, &user_data.replace("\"buyer\"", "\"admin\""))?;

        assert!(!validator.validate_authentication().await);
        assert_eq!(validator.policy().state().failed_attempts, 1);
        assert_eq!(calls(&validator), 0);
        Ok(())
    }

    #[tokio::test]
    async fn server_rejection_is_counted() {
        let (_, validator) = validator(false);
        assert!(validator.secure_token_storage(&token_for("u-1", 3600), &buyer("u-1")));
        assert!(!validator.validate_authentication().await);
        assert_eq!(validator.policy().state().failed_attempts, 1);
        assert_eq!(calls(&validator), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn three_rejections_lock_and_empty_storage() -> Result<()> {
        let (_, validator) = validator(false);
        assert!(validator.secure_token_storage(&token_for("u-1", 3600), &buyer("u-1")));
        let mut events = validator.policy().subscribe();

        for _ in 0..3 {
            assert!(!validator.validate_authentication().await);
        }

        assert!(validator.policy().is_locked());
        assert!(!validator.store().has_auth_data()?);
        assert!(events.try_recv().is_ok());

        // Locked: short-circuits without touching the network.
        assert!(validator.secure_token_storage(&token_for("u-1", 3600), &buyer("u-1")));
        validator.introspector.accept.store(true, Ordering::SeqCst);
        assert!(!validator.validate_authentication().await);
        assert_eq!(calls(&validator), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn evaluated_normally_after_lockout_expires() {
        let (_, validator) = validator(true);
        for _ in 0..2 {
            validator.policy().record_failure("invalid token format");
        }
        assert_eq!(
            validator.policy().record_failure("invalid token format"),
            FailureOutcome::Locked
        );

        tokio::time::advance(LOCKOUT).await;

        assert!(validator.secure_token_storage(&token_for("u-1", 3600), &buyer("u-1")));
        assert!(validator.validate_authentication().await);
        assert_eq!(validator.policy().state().failed_attempts, 0);
    }

    #[tokio::test]
    async fn secure_token_storage_rejects_expired_token() -> Result<()> {
        let (_, validator) = validator(true);
        assert!(!validator.secure_token_storage(&token_for("u-1", -1), &buyer("u-1")));
        assert!(!validator.store().has_auth_data()?);
        Ok(())
    }

    #[tokio::test]
    async fn logout_clears_everything() -> Result<()> {
        let (_, validator) = validator(true);
        assert!(validator.secure_token_storage(&token_for("u-1", 3600), &buyer("u-1")));
        validator.logout();
        assert!(!validator.store().has_auth_data()?);
        assert!(!validator.verify_integrity());
        Ok(())
    }
}
