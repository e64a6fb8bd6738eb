//! # idgate (client identity & session integrity)
//!
//! `idgate` is the client half of the GemNet identity flow. It keeps the bearer
//! credential a user obtained at login honest while it sits in local storage, and
//! it walks a new user through the three-step registration (personal info, face,
//! NIC document) against the REST backend.
//!
//! ## Session integrity
//!
//! The stored token, profile, and a tamper digest are written and cleared as one
//! unit by [`idgate::store::SessionStore`]. [`idgate::validator::AuthValidator`]
//! runs the cheap offline checks first and only then asks the backend to
//! introspect the token. Repeated violations trip the
//! [`idgate::policy::SecurityPolicy`] lockout, which erases every auth key and
//! signals a forced logout.
//!
//! ## Registration
//!
//! [`idgate::registration::Registration`] drives the network calls for each step
//! and persists [`idgate::registration::RegistrationProgress`] after every
//! mutation so a restart resumes exactly where the user left off.

pub mod cli;
pub mod idgate;

pub use crate::idgate::{Error, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
