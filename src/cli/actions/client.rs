use crate::{oauth::ClientDirectory, secret::SecretHasher};
use anyhow::{bail, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub enum Command {
    Create {
        description: String,
        redirect_uri: String,
    },
    List,
    Delete {
        id: Uuid,
    },
}

#[derive(Debug)]
pub struct Args {
    pub dsn: Option<String>,
    pub command: Command,
}

/// Execute a client management command.
/// # Errors
/// Returns an error if the database fails or the client does not exist.
pub async fn execute(args: Args) -> Result<()> {
    let store = super::connect(args.dsn.as_deref()).await?;
    let directory = ClientDirectory::new(Arc::new(store), SecretHasher::default());

    match args.command {
        Command::Create {
            description,
            redirect_uri,
        } => {
            let registered = directory.create(&description, &redirect_uri).await?;
            info!(client = %registered.client.id, "Client created");
            println!("client_id:     {}", registered.client.id);
            println!("client_secret: {}", registered.secret.expose_secret());
            println!("redirect_uri:  {}", registered.client.redirect_uri);
        }
        Command::List => {
            for client in directory.list().await? {
                println!(
                    "{}\t{}\t{}",
                    client.id, client.redirect_uri, client.description
                );
            }
        }
        Command::Delete { id } => {
            if !directory.delete(id).await? {
                bail!("client {id} not found");
            }
            info!(client = %id, "Client deleted");
        }
    }

    Ok(())
}
