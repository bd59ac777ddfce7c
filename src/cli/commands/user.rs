use super::{
    arg_id,
    serve::{arg_base_url, arg_url_login_key},
};
use clap::{Arg, Command};

pub const ARG_NAME: &str = "name";
pub const ARG_EXPIRES_SECONDS: &str = "expires-seconds";

#[must_use]
pub fn command() -> Command {
    Command::new("user")
        .about("Manage users")
        .subcommand_required(true)
        .subcommand(
            Command::new("create")
                .about("Create a user")
                .arg(Arg::new(ARG_NAME).help("Display name").required(true)),
        )
        .subcommand(Command::new("list").about("List users"))
        .subcommand(
            Command::new("delete")
                .about("Delete a user")
                .arg(arg_id("User id")),
        )
        .subcommand(
            Command::new("login")
                .about("Print a short-lived login link for a user")
                .arg(arg_id("User id"))
                .arg(
                    Arg::new(ARG_EXPIRES_SECONDS)
                        .long("expires-seconds")
                        .help("Link validity in seconds")
                        .default_value("30")
                        .value_parser(clap::value_parser!(u64).range(1..)),
                )
                .arg(arg_base_url())
                .arg(arg_url_login_key()),
        )
}
