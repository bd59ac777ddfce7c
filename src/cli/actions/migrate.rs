use anyhow::Result;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub dsn: Option<String>,
}

/// Apply the bundled schema.
/// # Errors
/// Returns an error if the database is unreachable or a statement fails.
pub async fn execute(args: Args) -> Result<()> {
    let store = super::connect(args.dsn.as_deref()).await?;
    let applied = store.migrate().await?;
    info!(statements = applied, "Schema applied");
    println!("Applied {applied} schema statements");
    Ok(())
}
