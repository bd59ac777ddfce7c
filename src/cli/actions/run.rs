use super::{client, generate, migrate, serve, session, user, Action};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Serve(args) => serve::execute(args).await,
        Action::Migrate(args) => migrate::execute(args).await,
        Action::Client(args) => client::execute(args).await,
        Action::User(args) => user::execute(args).await,
        Action::Session(args) => session::execute(args).await,
        Action::Generate(args) => generate::execute(&args),
    }
}
