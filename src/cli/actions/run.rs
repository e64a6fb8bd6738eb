use crate::cli::actions::{register, session, Action};
use anyhow::Result;

/// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Login(args) => session::login(args).await,
        Action::Status(globals) => session::status(globals).await,
        Action::Logout(globals) => session::logout(&globals),
        Action::Watch(globals) => session::watch(globals).await,
        Action::Register(args) => register::execute(args).await,
    }
}
