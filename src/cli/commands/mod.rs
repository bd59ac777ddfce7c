pub mod client;
pub mod generate;
pub mod logging;
pub mod serve;
pub mod session;
pub mod user;

use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};
use uuid::Uuid;

pub const ARG_DSN: &str = "dsn";
pub const ARG_ID: &str = "id";

#[must_use]
pub fn validator_uuid() -> ValueParser {
    ValueParser::from(move |id: &str| -> std::result::Result<Uuid, String> {
        Uuid::parse_str(id).map_err(|err| format!("invalid id: {err}"))
    })
}

/// Positional `<id>` shared by the delete/login subcommands.
pub(crate) fn arg_id(help: &'static str) -> Arg {
    Arg::new(ARG_ID)
        .help(help)
        .required(true)
        .value_parser(validator_uuid())
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!(
            "{} - {}",
            env!("CARGO_PKG_VERSION"),
            crate::onegate::GIT_COMMIT_HASH
        )
        .into_boxed_str(),
    );

    let command = Command::new("onegate")
        .about("Single sign-on with OAuth2 authorization code + PKCE")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("ONEGATE_DSN")
                .global(true),
        )
        .subcommand(serve::command())
        .subcommand(Command::new("migrate").about("Create or update the database schema"))
        .subcommand(client::command())
        .subcommand(user::command())
        .subcommand(session::command())
        .subcommand(generate::command());

    logging::with_args(command)
}
