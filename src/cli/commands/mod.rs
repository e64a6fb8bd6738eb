pub mod logging;
pub mod register;
pub mod session;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

use crate::idgate::config::DEFAULT_API_BASE_URL;

pub const ARG_API_URL: &str = "api-url";
pub const ARG_STORE: &str = "store";
pub const ARG_TIMEOUT: &str = "timeout";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("idgate")
        .about("Identity verification and session integrity")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_API_URL)
                .long("api-url")
                .help("Base URL of the auth API")
                .default_value(DEFAULT_API_BASE_URL)
                .env("IDGATE_API_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_STORE)
                .long("store")
                .help("Session file (default: $HOME/.idgate/session.json)")
                .env("IDGATE_STORE")
                .value_parser(clap::value_parser!(std::path::PathBuf))
                .global(true),
        )
        .arg(
            Arg::new(ARG_TIMEOUT)
                .long("timeout")
                .help("Request timeout in seconds (default: 30)")
                .env("IDGATE_TIMEOUT")
                .value_parser(clap::value_parser!(u64).range(1..))
                .global(true),
        );

    let command = session::with_subcommands(command);
    let command = register::with_subcommands(command);
    logging::with_args(command)
}
