use crate::{cli::commands::serve::decode_key, login::LoginTokens, storage::UserStore};
use anyhow::{anyhow, bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;
use url::Url;
use uuid::Uuid;

#[derive(Debug)]
pub enum Command {
    Create {
        name: String,
    },
    List,
    Delete {
        id: Uuid,
    },
    Login {
        id: Uuid,
        expires: Duration,
        base_url: Url,
        url_login_key: SecretString,
    },
}

#[derive(Debug)]
pub struct Args {
    pub dsn: Option<String>,
    pub command: Command,
}

/// Execute a user management command.
/// # Errors
/// Returns an error if the database fails or the user does not exist.
pub async fn execute(args: Args) -> Result<()> {
    let store = super::connect(args.dsn.as_deref()).await?;

    match args.command {
        Command::Create { name } => {
            let user = store.insert_user(&name).await?;
            info!(user = %user.id, "User created");
            println!("{}", user.id);
        }
        Command::List => {
            for user in store.list_users().await? {
                println!("{}\t{}", user.id, user.name);
            }
        }
        Command::Delete { id } => {
            if !store.delete_user(id).await? {
                bail!("user {id} not found");
            }
            info!(user = %id, "User deleted");
        }
        Command::Login {
            id,
            expires,
            base_url,
            url_login_key,
        } => {
            if store.user_by_id(id).await?.is_none() {
                bail!("user {id} not found");
            }
            let key = decode_key(url_login_key.expose_secret())
                .map_err(|err| anyhow!("invalid --url-login-key: {err}"))?;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("system clock before epoch")?
                .as_secs();
            let url = LoginTokens::new(key, &base_url)?.issue(id, expires, i64::try_from(now)?)?;
            println!("{url}");
        }
    }

    Ok(())
}
