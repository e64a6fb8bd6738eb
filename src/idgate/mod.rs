pub mod client;
pub mod config;
pub mod error;
pub mod integrity;
pub mod monitor;
pub mod policy;
pub mod profile;
pub mod registration;
pub mod retry;
pub mod store;
pub mod token;
pub mod validator;

pub use error::{Error, Result};
