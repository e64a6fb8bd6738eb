//! Three-step registration: personal info, face photo, NIC document.

pub mod image;
pub mod orchestrator;
pub mod outcome;
pub mod personal;
pub mod progress;

pub use image::{ImageKind, ImageUpload};
pub use orchestrator::Registration;
pub use outcome::{NicErrorKind, NicVerificationData, VerificationOutcome};
pub use personal::PersonalInfo;
pub use progress::{ProgressStore, RegistrationProgress, RegistrationStep, Transition};
