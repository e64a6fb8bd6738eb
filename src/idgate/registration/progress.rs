//! Registration step state machine and its persistence.
//!
//! Progress is the current step plus the furthest step unlocked so far. The
//! completion flags are derived from the latter, so a later step can never be
//! marked complete while an earlier one is not. Every change goes through
//! [`RegistrationProgress::apply`], which rejects transitions outside the table.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::idgate::store::{KeyValueStore, StoreError, REGISTRATION_PROGRESS_KEY};
use crate::idgate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegistrationStep {
    PersonalInfo = 1,
    FaceVerification = 2,
    NicVerification = 3,
    Complete = 4,
}

impl RegistrationStep {
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::PersonalInfo),
            2 => Some(Self::FaceVerification),
            3 => Some(Self::NicVerification),
            4 => Some(Self::Complete),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PersonalInfo => "PERSONAL_INFO",
            Self::FaceVerification => "FACE_VERIFICATION",
            Self::NicVerification => "NIC_VERIFICATION",
            Self::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStep {
    type Err = String;

    /// Accepts the step name in any case, with `-` or `_`, or its number.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase().replace('-', "_");
        if let Ok(number) = normalized.parse::<u8>() {
            return Self::from_number(number).ok_or_else(|| format!("invalid step: {value}"));
        }
        match normalized.as_str() {
            "PERSONAL_INFO" | "INFO" => Ok(Self::PersonalInfo),
            "FACE_VERIFICATION" | "FACE" => Ok(Self::FaceVerification),
            "NIC_VERIFICATION" | "NIC" => Ok(Self::NicVerification),
            "COMPLETE" => Ok(Self::Complete),
            _ => Err(format!("invalid step: {value}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    PersonalInfoAccepted { user_id: String },
    FaceVerified,
    NicVerified,
    /// User-initiated navigation; completion is left untouched.
    GoTo(RegistrationStep),
    Reset,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationProgress {
    current_step: RegistrationStep,
    reached: RegistrationStep,
    user_id: Option<String>,
}

impl Default for RegistrationProgress {
    fn default() -> Self {
        Self {
            current_step: RegistrationStep::PersonalInfo,
            reached: RegistrationStep::PersonalInfo,
            user_id: None,
        }
    }
}

impl RegistrationProgress {
    #[must_use]
    pub fn current_step(&self) -> RegistrationStep {
        self.current_step
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn personal_info_completed(&self) -> bool {
        self.reached > RegistrationStep::PersonalInfo
    }

    #[must_use]
    pub fn face_verification_completed(&self) -> bool {
        self.reached > RegistrationStep::FaceVerification
    }

    #[must_use]
    pub fn nic_verification_completed(&self) -> bool {
        self.reached > RegistrationStep::NicVerification
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current_step == RegistrationStep::Complete
    }

    /// Furthest step the user may navigate to.
    #[must_use]
    pub fn reachable(&self) -> RegistrationStep {
        self.reached
    }

    /// # Errors
    /// Returns [`Error::Transition`] when `transition` is not allowed from the
    /// current state; the progress is left unchanged.
    pub fn apply(&mut self, transition: Transition) -> Result<()> {
        use RegistrationStep::{Complete, FaceVerification, NicVerification, PersonalInfo};

        let next = match (self.current_step, transition) {
            (PersonalInfo, Transition::PersonalInfoAccepted { user_id }) => Self {
                current_step: FaceVerification,
                reached: self.reached.max(FaceVerification),
                user_id: Some(user_id),
            },
            (FaceVerification, Transition::FaceVerified) => Self {
                current_step: NicVerification,
                reached: self.reached.max(NicVerification),
                user_id: self.user_id.clone(),
            },
            (NicVerification, Transition::NicVerified) => Self {
                current_step: Complete,
                reached: Complete,
                user_id: self.user_id.clone(),
            },
            (_, Transition::GoTo(step)) if step <= self.reached => Self {
                current_step: step,
                ..self.clone()
            },
            (_, Transition::Reset) => Self::default(),
            (from, transition) => {
                return Err(Error::Transition(format!("{transition:?} from {from}")));
            }
        };

        debug!(
            "registration: {} -> {}",
            self.current_step, next.current_step
        );
        *self = next;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressRecord {
    current_step: u8,
    #[serde(default)]
    personal_info_completed: bool,
    #[serde(default)]
    face_verification_completed: bool,
    #[serde(default)]
    nic_verification_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

impl Serialize for RegistrationProgress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ProgressRecord {
            current_step: self.current_step.number(),
            personal_info_completed: self.personal_info_completed(),
            face_verification_completed: self.face_verification_completed(),
            nic_verification_completed: self.nic_verification_completed(),
            user_id: self.user_id.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RegistrationProgress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;

        let record = ProgressRecord::deserialize(deserializer)?;
        let current_step = RegistrationStep::from_number(record.current_step)
            .ok_or_else(|| D::Error::custom(format!("invalid step {}", record.current_step)))?;

        let reached = match (
            record.personal_info_completed,
            record.face_verification_completed,
            record.nic_verification_completed,
        ) {
            (false, false, false) => RegistrationStep::PersonalInfo,
            (true, false, false) => RegistrationStep::FaceVerification,
            (true, true, false) => RegistrationStep::NicVerification,
            (true, true, true) => RegistrationStep::Complete,
            _ => return Err(D::Error::custom("completion flags out of order")),
        };
        if current_step > reached {
            return Err(D::Error::custom(format!(
                "step {current_step} not reachable yet"
            )));
        }

        Ok(Self {
            current_step,
            reached,
            user_id: record.user_id,
        })
    }
}

/// Keeps [`RegistrationProgress`] under the `registrationProgress` key.
#[derive(Clone)]
pub struct ProgressStore {
    backend: Arc<dyn KeyValueStore>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// A missing or unreadable record starts a fresh registration.
    ///
    /// # Errors
    /// Returns an error if the backend is unavailable.
    pub fn load(&self) -> Result<RegistrationProgress, StoreError> {
        let Some(raw) = self.backend.get(REGISTRATION_PROGRESS_KEY)? else {
            return Ok(RegistrationProgress::default());
        };
        match serde_json::from_str(&raw) {
            Ok(progress) => Ok(progress),
            Err(err) => {
                warn!("discarding unreadable registration progress: {err}");
                Ok(RegistrationProgress::default())
            }
        }
    }

    /// # Errors
    /// Returns an error if the backend is unavailable.
    pub fn save(&self, progress: &RegistrationProgress) -> Result<(), StoreError> {
        let json = serde_json::to_string(progress)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        self.backend.set(REGISTRATION_PROGRESS_KEY, &json)
    }

    /// # Errors
    /// Returns an error if the backend is unavailable.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove(REGISTRATION_PROGRESS_KEY)
    }
}
