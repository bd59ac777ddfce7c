use crate::storage::{postgres::purge_statement, SessionPurge, SessionStore};
use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

#[derive(Debug)]
pub enum Command {
    List { active_seconds: i64 },
    DeleteAll { purge: SessionPurge, dry_run: bool },
}

#[derive(Debug)]
pub struct Args {
    pub dsn: Option<String>,
    pub command: Command,
}

/// Execute a session housekeeping command.
/// # Errors
/// Returns an error if the database fails.
pub async fn execute(args: Args) -> Result<()> {
    match args.command {
        Command::List { active_seconds } => {
            let store = super::connect(args.dsn.as_deref()).await?;
            let now = i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())?;
            for session in store.list_sessions().await? {
                let user = session
                    .user_id
                    .map_or_else(|| "-".to_string(), |id| id.to_string());
                let status = if session.deleted {
                    "deleted"
                } else if session.is_active(now, active_seconds) {
                    "active"
                } else {
                    "inactive"
                };
                println!(
                    "{}\t{}\t{}\t{}",
                    session.id, user, session.updated_at_unix, status
                );
            }
        }
        Command::DeleteAll { purge, dry_run } => {
            if dry_run {
                println!("{}", purge_statement(purge));
                if let Some(seconds) = purge.inactive_for_seconds {
                    println!("-- $1 = {seconds}");
                }
                return Ok(());
            }
            let store = super::connect(args.dsn.as_deref()).await?;
            let affected = store.purge_sessions(purge).await?;
            info!(sessions = affected, scope = ?purge.scope, "Sessions purged");
            println!("{affected} sessions affected");
        }
    }

    Ok(())
}
