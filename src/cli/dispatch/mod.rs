//! Maps validated CLI matches to an [`Action`].

use crate::cli::actions::{register, session::LoginArgs, Action};
use crate::cli::commands::{self, register as reg, session};
use crate::cli::globals::{default_store_path, GlobalArgs};
use crate::idgate::registration::{PersonalInfo, RegistrationStep};
use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

fn required(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{name}"))
}

fn image(matches: &ArgMatches) -> Result<PathBuf> {
    matches
        .get_one::<PathBuf>(reg::ARG_IMAGE)
        .cloned()
        .context("missing required argument: --image")
}

fn globals(matches: &ArgMatches) -> Result<GlobalArgs> {
    let api_url = required(matches, commands::ARG_API_URL)?;
    let store_path = match matches.get_one::<PathBuf>(commands::ARG_STORE) {
        Some(path) => path.clone(),
        None => default_store_path()
            .context("no home directory, pass --store or set IDGATE_STORE")?,
    };
    let timeout = matches
        .get_one::<u64>(commands::ARG_TIMEOUT)
        .map(|secs| Duration::from_secs(*secs));

    Ok(GlobalArgs::new(api_url, store_path).with_timeout(timeout))
}

fn register_step(matches: &ArgMatches) -> Result<register::Step> {
    Ok(match matches.subcommand() {
        Some((reg::CMD_INFO, sub)) => register::Step::Info(PersonalInfo {
            first_name: required(sub, reg::ARG_FIRST_NAME)?,
            last_name: required(sub, reg::ARG_LAST_NAME)?,
            email: required(sub, reg::ARG_EMAIL)?,
            password: SecretString::from(required(sub, session::ARG_PASSWORD)?),
            phone_number: required(sub, reg::ARG_PHONE)?,
            address: required(sub, reg::ARG_ADDRESS)?,
            date_of_birth: required(sub, reg::ARG_DATE_OF_BIRTH)?,
            nic_number: required(sub, reg::ARG_NIC)?,
        }),
        Some((reg::CMD_FACE, sub)) => register::Step::Face { image: image(sub)? },
        Some((reg::CMD_NIC, sub)) => register::Step::Nic { image: image(sub)? },
        Some((reg::CMD_BACK, sub)) => register::Step::Back {
            step: required(sub, reg::ARG_STEP)?
                .parse::<RegistrationStep>()
                .map_err(|err| anyhow!("invalid --step: {err}"))?,
        },
        Some((reg::CMD_SHOW, _)) => register::Step::Show,
        Some((reg::CMD_RESET, _)) => register::Step::Reset,
        _ => bail!("unknown register step"),
    })
}

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let globals = globals(matches)?;

    Ok(match matches.subcommand() {
        Some((session::CMD_LOGIN, sub)) => Action::Login(LoginArgs {
            globals,
            email: required(sub, session::ARG_EMAIL)?,
            password: SecretString::from(required(sub, session::ARG_PASSWORD)?),
        }),
        Some((session::CMD_STATUS, _)) => Action::Status(globals),
        Some((session::CMD_LOGOUT, _)) => Action::Logout(globals),
        Some((session::CMD_WATCH, _)) => Action::Watch(globals),
        Some((reg::CMD_REGISTER, sub)) => Action::Register(register::Args {
            globals,
            step: register_step(sub)?,
        }),
        _ => bail!("unknown command"),
    })
}
