pub mod register;
pub mod session;

// The match over every action lives in `run` so this module stays a list.
mod run;

use crate::cli::globals::GlobalArgs;

#[derive(Debug)]
pub enum Action {
    Login(session::LoginArgs),
    Status(GlobalArgs),
    Logout(GlobalArgs),
    Watch(GlobalArgs),
    Register(register::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
