//! Client directory: registration and secret verification of relying parties.

use crate::secret::{self, SecretHasher};
use crate::storage::{Client, Store};
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client verification failed")]
pub struct VerificationFailed;

impl Client {
    /// Check a presented `client_secret`. Bad encoding and a wrong secret look the same.
    ///
    /// # Errors
    /// Returns `VerificationFailed` on any mismatch.
    pub fn verify_secret(&self, candidate: &str) -> Result<(), VerificationFailed> {
        let raw = secret::decode_secret(candidate).map_err(|_| VerificationFailed)?;
        if secret::verify(&raw, &self.secret_hash) {
            Ok(())
        } else {
            Err(VerificationFailed)
        }
    }
}

/// A client that was just registered. `secret` is never available again.
#[derive(Debug)]
pub struct RegisteredClient {
    pub client: Client,
    pub secret: SecretString,
}

#[derive(Clone)]
pub struct ClientDirectory {
    store: Arc<dyn Store>,
    hasher: SecretHasher,
}

impl ClientDirectory {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, hasher: SecretHasher) -> Self {
        Self { store, hasher }
    }

    /// # Errors
    /// Returns an error if the store fails; an unknown id is `Ok(None)`.
    pub async fn by_id(&self, id: Uuid) -> Result<Option<Client>> {
        self.store.client_by_id(id).await
    }

    /// Register a client and hand back its plaintext secret once.
    ///
    /// # Errors
    /// Returns an error if `redirect_uri` is not an absolute URL or persistence fails.
    pub async fn create(&self, description: &str, redirect_uri: &str) -> Result<RegisteredClient> {
        let parsed = Url::parse(redirect_uri)
            .with_context(|| format!("invalid redirect URI: {redirect_uri}"))?;
        if parsed.fragment().is_some() {
            bail!("redirect URI must not contain a fragment: {redirect_uri}");
        }

        let generated = self.hasher.generate()?;
        let client = Client {
            id: Uuid::new_v4(),
            description: description.to_string(),
            redirect_uri: parsed.to_string(),
            secret_hash: generated.phc,
            created_at_unix: 0,
        };
        self.store.insert_client(&client).await?;

        Ok(RegisteredClient {
            client,
            secret: generated.plaintext,
        })
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn list(&self) -> Result<Vec<Client>> {
        self.store.list_clients().await
    }

    /// Soft-delete a client. Returns `false` if it did not exist.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.store.delete_client(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::cheap_hasher;
    use crate::storage::memory::MemoryStore;
    use secrecy::ExposeSecret;

    fn directory() -> ClientDirectory {
        ClientDirectory::new(Arc::new(MemoryStore::default()), cheap_hasher())
    }

    #[tokio::test]
    async fn create_then_verify() {
        let directory = directory();
        let registered = directory
            .create("demo app", "https://app.example/cb")
            .await
            .unwrap();

        let client = directory.by_id(registered.client.id).await.unwrap().unwrap();
        assert_eq!(client.redirect_uri, "https://app.example/cb");
        assert!(client.secret_hash.starts_with("$argon2id$"));
        assert!(!client
            .secret_hash
            .contains(registered.secret.expose_secret()));

        assert!(client
            .verify_secret(registered.secret.expose_secret())
            .is_ok());
        let padded = format!("{}=", registered.secret.expose_secret());
        assert!(client.verify_secret(&padded).is_ok());
    }

    #[tokio::test]
    async fn wrong_or_malformed_secrets_fail_alike() {
        let directory = directory();
        let registered = directory
            .create("demo app", "https://app.example/cb")
            .await
            .unwrap();
        let client = registered.client;

        assert_eq!(
            client.verify_secret("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
            Err(VerificationFailed)
        );
        assert_eq!(client.verify_secret("not base64!"), Err(VerificationFailed));
        assert_eq!(client.verify_secret(""), Err(VerificationFailed));
    }

    #[test]
    fn legacy_pbkdf2_clients_still_verify() {
        let client = Client {
            id: Uuid::nil(),
            description: String::new(),
            redirect_uri: "https://app.example/cb".to_string(),
            // secret bytes: b"a" -> base64url "YQ"
            secret_hash: "$pbkdf2-sha1$i=1,k=32$AQID$gbkoCyl+kgPHGtDI1sbgzYTjh1vawpwGBu7TsfyyQ7Y"
                .to_string(),
            created_at_unix: 0,
        };
        assert!(client.verify_secret("YQ").is_ok());
        assert!(client.verify_secret("Yg").is_err());
    }

    #[tokio::test]
    async fn rejects_bad_redirect_uris() {
        let directory = directory();
        assert!(directory.create("x", "not a url").await.is_err());
        assert!(directory.create("x", "/relative/path").await.is_err());
        assert!(directory
            .create("x", "https://app.example/cb#frag")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn delete_hides_client() {
        let directory = directory();
        let registered = directory
            .create("demo app", "https://app.example/cb")
            .await
            .unwrap();
        assert!(directory.delete(registered.client.id).await.unwrap());
        assert!(directory.by_id(registered.client.id).await.unwrap().is_none());
        assert!(!directory.delete(registered.client.id).await.unwrap());
    }
}
