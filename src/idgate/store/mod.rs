//! Persistence boundary for the session and registration progress.
//!
//! Backends implement [`KeyValueStore`]; [`SessionStore`] layers the auth key
//! set, validation on write and the integrity digest on top and serializes all
//! of its own reads and writes through one critical section.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{
    integrity::{self, DigestInput},
    profile::UserProfile,
    token::{self, TokenClaims, TokenError},
};

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const USER_DATA_KEY: &str = "userData";
pub const AUTH_INTEGRITY_KEY: &str = "authIntegrity";
pub const REGISTRATION_PROGRESS_KEY: &str = "registrationProgress";

/// Keys written by earlier client versions; removed on every clear.
pub const LEGACY_AUTH_KEYS: [&str; 6] = [
    "user",
    "token",
    "userId",
    "userRole",
    "refreshToken",
    "sessionId",
];

/// Keys whose external modification must be re-validated.
pub const WATCHED_KEYS: [&str; 3] = [AUTH_TOKEN_KEY, USER_DATA_KEY, AUTH_INTEGRITY_KEY];

/// Identifies which handle made a change. Browser tabs each get one.
pub type Origin = u64;

/// Origin used for changes made outside this process.
pub const EXTERNAL_ORIGIN: Origin = 0;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt store: {0}")]
    Corrupt(String),
    #[error("serialization: {0}")]
    Serialization(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Set(String, String),
    Remove(String),
}

impl StoreOp {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set(key, _) | Self::Remove(key) => key,
        }
    }
}

/// Durable key/value storage scoped to one client.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backend is unavailable.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Applies every operation or none of them.
    ///
    /// # Errors
    /// Returns an error if the backend is unavailable.
    fn apply(&self, ops: Vec<StoreOp>) -> Result<(), StoreError>;

    /// The origin stamped on events caused by this handle.
    fn origin(&self) -> Origin;

    /// Change feed covering every handle on the same backing storage.
    fn watch(&self) -> broadcast::Receiver<StorageEvent>;

    /// # Errors
    /// Returns an error if the backend is unavailable.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.apply(vec![StoreOp::Set(key.to_string(), value.to_string())])
    }

    /// # Errors
    /// Returns an error if the backend is unavailable.
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.apply(vec![StoreOp::Remove(key.to_string())])
    }
}

/// A decoded bearer credential. The token stays wrapped so it never ends up in
/// debug output.
#[derive(Clone, Debug)]
pub struct Credential {
    pub token: SecretString,
    pub issued_at: i64,
    pub expires_at: i64,
    pub subject: String,
}

impl Credential {
    /// # Errors
    /// Returns the structural problem if the token fails [`token::decode`].
    pub fn from_token(raw: &str) -> Result<Self, TokenError> {
        let TokenClaims { sub, exp, iat } = token::decode(raw)?;
        Ok(Self {
            token: SecretString::from(raw.to_string()),
            issued_at: iat,
            expires_at: exp,
            subject: sub,
        })
    }
}

/// The three stored pieces as they sit in storage, undecoded.
#[derive(Clone, Debug)]
pub struct RawSession {
    pub token: SecretString,
    pub user_data: String,
    pub digest: Option<String>,
}

impl RawSession {
    /// Decodes the stored token.
    ///
    /// # Errors
    /// Returns the structural problem if the token fails [`token::decode`].
    pub fn credential(&self) -> Result<Credential, TokenError> {
        Credential::from_token(self.token.expose_secret())
    }

    /// `None` when `userData` is not JSON.
    #[must_use]
    pub fn profile_record(&self) -> Option<Value> {
        serde_json::from_str(&self.user_data).ok()
    }

    /// `None` when `userData` fails profile validation.
    #[must_use]
    pub fn profile(&self) -> Option<UserProfile> {
        UserProfile::from_record(&self.profile_record()?)
    }

    /// Recomputes the digest from this snapshot and compares it with the
    /// stored one.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        let Some(digest) = self.digest.as_deref() else {
            warn!("security: missing integrity digest");
            return false;
        };
        let Some(record) = self.profile_record() else {
            warn!("security: user data is not valid JSON");
            return false;
        };
        let Some(profile) = UserProfile::from_record(&record) else {
            warn!("security: stored user data failed validation");
            return false;
        };

        let token = self.token.expose_secret();
        let intact = integrity::verify(
            digest,
            &DigestInput {
                token,
                user_id: &profile.user_id,
                role: profile.role,
                timestamp: record_timestamp(&record),
            },
        );

        if intact {
            debug!("security: integrity check passed");
        } else {
            warn!("security: data integrity check failed");
        }
        intact
    }
}

#[derive(Serialize)]
struct UserRecord<'a> {
    #[serde(flatten)]
    profile: &'a UserProfile,
    timestamp: i64,
}

fn record_timestamp(record: &Value) -> i64 {
    record.get("timestamp").and_then(Value::as_i64).unwrap_or(0)
}

pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
    critical: Mutex<()>,
}

impl SessionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            critical: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Validates both inputs, then persists token, profile and digest in one
    /// operation. Returns `Ok(false)` without touching storage when either
    /// input is invalid.
    ///
    /// # Errors
    /// Returns an error if the backend is unavailable.
    pub fn write(&self, credential: &Credential, profile: &UserProfile) -> Result<bool, StoreError> {
        self.write_at(credential, profile, token::now_unix_millis())
    }

    pub(crate) fn write_at(
        &self,
        credential: &Credential,
        profile: &UserProfile,
        timestamp: i64,
    ) -> Result<bool, StoreError> {
        let token = credential.token.expose_secret();
        if !token::is_structurally_valid(token) || !profile.is_valid() {
            warn!("security: invalid data provided for storage");
            return Ok(false);
        }

        let record = UserRecord { profile, timestamp };
        let user_data = serde_json::to_string(&record)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        let digest = integrity::compute_digest(&DigestInput {
            token,
            user_id: &profile.user_id,
            role: profile.role,
            timestamp,
        });

        let _guard = self.critical.lock().unwrap_or_else(PoisonError::into_inner);
        self.backend.apply(vec![
            StoreOp::Set(AUTH_TOKEN_KEY.to_string(), token.to_string()),
            StoreOp::Set(USER_DATA_KEY.to_string(), user_data),
            StoreOp::Set(AUTH_INTEGRITY_KEY.to_string(), digest),
        ])?;

        info!("security: authentication data stored for user {}", profile.user_id);
        Ok(true)
    }

    /// `None` when the token or the profile is missing.
    ///
    /// # Errors
    /// Returns an error if the backend is unavailable.
    pub fn read(&self) -> Result<Option<RawSession>, StoreError> {
        let _guard = self.critical.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_locked()
    }

    fn read_locked(&self) -> Result<Option<RawSession>, StoreError> {
        let token = self.backend.get(AUTH_TOKEN_KEY)?.filter(|t| !t.is_empty());
        let user_data = self.backend.get(USER_DATA_KEY)?.filter(|u| !u.is_empty());
        let (Some(token), Some(user_data)) = (token, user_data) else {
            return Ok(None);
        };
        let digest = self.backend.get(AUTH_INTEGRITY_KEY)?;

        Ok(Some(RawSession {
            token: SecretString::from(token),
            user_data,
            digest,
        }))
    }

    /// True when any current or legacy auth key is present.
    ///
    /// # Errors
    /// Returns an error if the backend is unavailable.
    pub fn has_auth_data(&self) -> Result<bool, StoreError> {
        let _guard = self.critical.lock().unwrap_or_else(PoisonError::into_inner);
        for key in WATCHED_KEYS.iter().chain(LEGACY_AUTH_KEYS.iter()) {
            if self.backend.get(key)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Removes every auth key, current and legacy, plus registration progress,
    /// in a single backend operation.
    ///
    /// # Errors
    /// Returns an error if the backend is unavailable.
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.critical.lock().unwrap_or_else(PoisonError::into_inner);
        let ops = WATCHED_KEYS
            .iter()
            .chain(std::iter::once(&REGISTRATION_PROGRESS_KEY))
            .chain(LEGACY_AUTH_KEYS.iter())
            .map(|key| StoreOp::Remove((*key).to_string()))
            .collect();
        self.backend.apply(ops)?;
        info!("security: cleared all authentication data");
        Ok(())
    }

    /// Recomputes the digest from what is stored now and compares it with the
    /// stored digest. Any missing piece fails the check.
    ///
    /// # Errors
    /// Returns an error if the backend is unavailable.
    pub fn verify_integrity(&self) -> Result<bool, StoreError> {
        let _guard = self.critical.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(session) = self.read_locked()? else {
            warn!("security: missing integrity check data");
            return Ok(false);
        };
        Ok(session.is_intact())
    }
}

#[cfg(test)]
pub(crate) mod test_credentials {
    use super::*;
    use crate::idgate::token::{now_unix_seconds, test_tokens::token_for};

    /// Built without decoding so expired credentials can be made too.
    pub(crate) fn credential_for(sub: &str, ttl: i64) -> Credential {
        let now = now_unix_seconds();
        Credential {
            token: SecretString::from(token_for(sub, ttl)),
            issued_at: now,
            expires_at: now + ttl,
            subject: sub.to_string(),
        }
    }
}
