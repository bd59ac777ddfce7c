//! Map validated CLI matches to an `Action`.

use crate::cli::{
    actions::{client, generate, migrate, serve, session, user, Action},
    commands::{
        self, client as client_args, serve as serve_args, session as session_args,
        user as user_args, ARG_DSN, ARG_ID,
    },
};
use crate::storage::{PurgeScope, SessionPurge};
use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};
use url::Url;
use uuid::Uuid;

fn required<'a, T: Clone + Send + Sync + 'static>(
    matches: &'a ArgMatches,
    name: &str,
) -> Result<&'a T> {
    matches
        .get_one::<T>(name)
        .with_context(|| format!("missing required argument: --{name}"))
}

fn id(matches: &ArgMatches) -> Result<Uuid> {
    required::<Uuid>(matches, ARG_ID).copied()
}

fn secret(matches: &ArgMatches, name: &str) -> Result<SecretString> {
    required::<String>(matches, name).map(|value| SecretString::from(value.clone()))
}

fn serve(matches: &ArgMatches, dsn: Option<String>) -> Result<Action> {
    Ok(Action::Serve(serve::Args {
        port: *required::<u16>(matches, serve_args::ARG_PORT)?,
        dsn,
        base_url: required::<Url>(matches, serve_args::ARG_BASE_URL)?.clone(),
        session_key: secret(matches, serve_args::ARG_SESSION_KEY)?,
        url_login_key: secret(matches, serve_args::ARG_URL_LOGIN_KEY)?,
        private_key: PathBuf::from(required::<String>(matches, serve_args::ARG_PRIVATE_KEY)?),
        id_token_ttl_seconds: *required::<u64>(matches, serve_args::ARG_ID_TOKEN_TTL_SECONDS)?,
        rate_limit_requests: *required::<u32>(matches, serve_args::ARG_RATE_LIMIT_REQUESTS)?,
        rate_limit_window_seconds: *required::<u64>(
            matches,
            serve_args::ARG_RATE_LIMIT_WINDOW_SECONDS,
        )?,
    }))
}

fn client(matches: &ArgMatches, dsn: Option<String>) -> Result<Action> {
    let command = match matches.subcommand() {
        Some(("create", sub)) => client::Command::Create {
            description: required::<String>(sub, client_args::ARG_DESCRIPTION)?.clone(),
            redirect_uri: required::<String>(sub, client_args::ARG_REDIRECT_URI)?.clone(),
        },
        Some(("list", _)) => client::Command::List,
        Some(("delete", sub)) => client::Command::Delete { id: id(sub)? },
        other => return Err(unknown("client", other)),
    };
    Ok(Action::Client(client::Args { dsn, command }))
}

fn user(matches: &ArgMatches, dsn: Option<String>) -> Result<Action> {
    let command = match matches.subcommand() {
        Some(("create", sub)) => user::Command::Create {
            name: required::<String>(sub, user_args::ARG_NAME)?.clone(),
        },
        Some(("list", _)) => user::Command::List,
        Some(("delete", sub)) => user::Command::Delete { id: id(sub)? },
        Some(("login", sub)) => user::Command::Login {
            id: id(sub)?,
            expires: Duration::from_secs(*required::<u64>(sub, user_args::ARG_EXPIRES_SECONDS)?),
            base_url: required::<Url>(sub, serve_args::ARG_BASE_URL)?.clone(),
            url_login_key: secret(sub, serve_args::ARG_URL_LOGIN_KEY)?,
        },
        other => return Err(unknown("user", other)),
    };
    Ok(Action::User(user::Args { dsn, command }))
}

fn session(matches: &ArgMatches, dsn: Option<String>) -> Result<Action> {
    let command = match matches.subcommand() {
        Some(("list", sub)) => session::Command::List {
            active_seconds: *required::<i64>(sub, session_args::ARG_ACTIVE_SECONDS)?,
        },
        Some(("delete-all", sub)) => {
            let scope = if sub.get_flag(session_args::ARG_SOFT_DELETE) {
                PurgeScope::SoftDelete
            } else if sub.get_flag(session_args::ARG_DELETED) {
                PurgeScope::DeletedOnly
            } else {
                PurgeScope::All
            };
            let inactive_for_seconds = if sub.get_flag(session_args::ARG_INACTIVE) {
                Some(*required::<i64>(sub, session_args::ARG_ACTIVE_SECONDS)?)
            } else {
                None
            };
            session::Command::DeleteAll {
                purge: SessionPurge {
                    scope,
                    inactive_for_seconds,
                },
                dry_run: sub.get_flag(session_args::ARG_DRY_RUN),
            }
        }
        other => return Err(unknown("session", other)),
    };
    Ok(Action::Session(session::Args { dsn, command }))
}

fn generate(matches: &ArgMatches) -> Result<Action> {
    let args = match matches.subcommand() {
        Some(("secret", _)) => generate::Args::Secret,
        Some(("private-key", _)) => generate::Args::PrivateKey,
        Some(("public-key", sub)) => generate::Args::PublicKey {
            private_key: sub
                .get_one::<String>(serve_args::ARG_PRIVATE_KEY)
                .map(PathBuf::from),
        },
        Some(("key", _)) => generate::Args::Key,
        other => return Err(unknown("generate", other)),
    };
    Ok(Action::Generate(args))
}

fn unknown(group: &str, subcommand: Option<(&str, &ArgMatches)>) -> anyhow::Error {
    anyhow!(
        "unknown {group} command: {}",
        subcommand.map_or("<none>", |(name, _)| name)
    )
}

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or the subcommand is unknown.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let dsn = matches.get_one::<String>(ARG_DSN).cloned();

    match matches.subcommand() {
        Some(("serve", sub)) => serve(sub, dsn),
        Some(("migrate", _)) => Ok(Action::Migrate(migrate::Args { dsn })),
        Some(("client", sub)) => client(sub, dsn),
        Some(("user", sub)) => user(sub, dsn),
        Some(("session", sub)) => session(sub, dsn),
        Some(("generate", sub)) => generate(sub),
        other => Err(unknown(commands::new().get_name(), other)),
    }
}
