use crate::{jwt::decode_signing_key, secret::SecretHasher};
use anyhow::{anyhow, Context, Result};
use base64ct::{Base64, Encoding};
use p256::{
    ecdsa::SigningKey,
    pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding},
};
use rand::{rngs::OsRng, RngCore};
use secrecy::ExposeSecret;
use std::{io::Read, path::PathBuf};

const KEY_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Args {
    Secret,
    PrivateKey,
    /// `None` reads the private key from stdin.
    PublicKey { private_key: Option<PathBuf> },
    Key,
}

/// Generate a server key: 32 random bytes, standard base64.
///
/// # Errors
/// Returns an error if randomness is unavailable.
pub fn key() -> Result<String> {
    let mut key = [0u8; KEY_LENGTH];
    OsRng
        .try_fill_bytes(&mut key)
        .context("failed to generate key")?;
    Ok(Base64::encode_string(&key))
}

/// Generate a P-256 signing key as PKCS#8 PEM.
///
/// # Errors
/// Returns an error if the key cannot be encoded.
pub fn private_key() -> Result<String> {
    let key = SigningKey::random(&mut OsRng);
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|err| anyhow!("failed to encode private key: {err}"))?;
    Ok(pem.to_string())
}

/// SPKI PEM of the public half of a P-256 private key (PKCS#8 or SEC1 PEM).
///
/// # Errors
/// Returns an error if the private key cannot be parsed.
pub fn public_key(private_key_pem: &str) -> Result<String> {
    let key = decode_signing_key(private_key_pem)?;
    key.verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|err| anyhow!("failed to encode public key: {err}"))
}

fn read_private_key(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut pem = String::new();
            std::io::stdin()
                .read_to_string(&mut pem)
                .context("failed to read private key from stdin")?;
            Ok(pem)
        }
    }
}

/// Print the requested material to stdout.
/// # Errors
/// Returns an error if generation fails.
pub fn execute(args: &Args) -> Result<()> {
    match args {
        Args::Secret => {
            let generated = SecretHasher::default().generate()?;
            println!("secret: {}", generated.plaintext.expose_secret());
            println!("hash:   {}", generated.phc);
        }
        Args::PrivateKey => print!("{}", private_key()?),
        Args::PublicKey { private_key } => {
            print!("{}", public_key(&read_private_key(private_key.as_ref())?)?);
        }
        Args::Key => println!("{}", key()?),
    }
    Ok(())
}
