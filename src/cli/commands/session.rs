use clap::{Arg, Command};

pub const CMD_LOGIN: &str = "login";
pub const CMD_STATUS: &str = "status";
pub const CMD_LOGOUT: &str = "logout";
pub const CMD_WATCH: &str = "watch";

pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";

#[must_use]
pub fn password_arg() -> Arg {
    Arg::new(ARG_PASSWORD)
        .long("password")
        .help("Account password")
        .env("IDGATE_PASSWORD")
        .hide_env_values(true)
        .required(true)
}

#[must_use]
pub fn with_subcommands(command: Command) -> Command {
    command
        .subcommand(
            Command::new(CMD_LOGIN)
                .about("Log in and store the session")
                .arg(
                    Arg::new(ARG_EMAIL)
                        .long("email")
                        .help("Account email")
                        .env("IDGATE_EMAIL")
                        .required(true),
                )
                .arg(password_arg()),
        )
        .subcommand(
            Command::new(CMD_STATUS).about("Validate the stored session against the server"),
        )
        .subcommand(Command::new(CMD_LOGOUT).about("Remove every stored credential"))
        .subcommand(
            Command::new(CMD_WATCH)
                .about("Monitor the session store for tampering until interrupted"),
        )
}
