pub mod client;
pub mod generate;
pub mod migrate;
pub mod serve;
pub mod session;
pub mod user;

// Internal "interpreter" for `Action`.
mod run;

use crate::storage::PgStore;
use anyhow::{Context, Result};

#[derive(Debug)]
pub enum Action {
    Serve(serve::Args),
    Migrate(migrate::Args),
    Client(client::Args),
    User(user::Args),
    Session(session::Args),
    Generate(generate::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        run::execute(self).await
    }
}

/// Connect to the store named by `--dsn`.
pub(crate) async fn connect(dsn: Option<&str>) -> Result<PgStore> {
    let dsn = dsn.context("missing required argument: --dsn")?;
    PgStore::connect(dsn).await
}
