use clap::{Arg, Command};

use super::session::password_arg;

pub const CMD_REGISTER: &str = "register";
pub const CMD_INFO: &str = "info";
pub const CMD_FACE: &str = "face";
pub const CMD_NIC: &str = "nic";
pub const CMD_BACK: &str = "back";
pub const CMD_SHOW: &str = "show";
pub const CMD_RESET: &str = "reset";

pub const ARG_FIRST_NAME: &str = "first-name";
pub const ARG_LAST_NAME: &str = "last-name";
pub const ARG_EMAIL: &str = "email";
pub const ARG_PHONE: &str = "phone";
pub const ARG_ADDRESS: &str = "address";
pub const ARG_DATE_OF_BIRTH: &str = "date-of-birth";
pub const ARG_NIC: &str = "nic";
pub const ARG_IMAGE: &str = "image";
pub const ARG_STEP: &str = "step";

fn required(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).help(help).required(true)
}

fn image_arg() -> Arg {
    Arg::new(ARG_IMAGE)
        .long("image")
        .help("Path to a JPEG, PNG or GIF image")
        .value_parser(clap::value_parser!(std::path::PathBuf))
        .required(true)
}

#[must_use]
pub fn with_subcommands(command: Command) -> Command {
    command.subcommand(
        Command::new(CMD_REGISTER)
            .about("Register a new account step by step")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(
                Command::new(CMD_INFO)
                    .about("Submit personal information")
                    .arg(required(ARG_FIRST_NAME, "First name"))
                    .arg(required(ARG_LAST_NAME, "Last name"))
                    .arg(required(ARG_EMAIL, "Email address"))
                    .arg(password_arg())
                    .arg(required(ARG_PHONE, "Mobile number, e.g. +94771234567"))
                    .arg(required(ARG_ADDRESS, "Postal address"))
                    .arg(required(ARG_DATE_OF_BIRTH, "Date of birth, YYYY-MM-DD"))
                    .arg(required(ARG_NIC, "NIC number")),
            )
            .subcommand(
                Command::new(CMD_FACE)
                    .about("Upload a face photo")
                    .arg(image_arg()),
            )
            .subcommand(
                Command::new(CMD_NIC)
                    .about("Upload a photo of the NIC")
                    .arg(image_arg()),
            )
            .subcommand(
                Command::new(CMD_BACK)
                    .about("Go back to a step already reached")
                    .arg(
                        Arg::new(ARG_STEP)
                            .long("step")
                            .help("info, face, nic or a step number 1-3")
                            .required(true),
                    ),
            )
            .subcommand(Command::new(CMD_SHOW).about("Print the registration progress"))
            .subcommand(Command::new(CMD_RESET).about("Start the registration over")),
    )
}
