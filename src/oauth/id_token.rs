//! OpenID id token issuance (ES256).

use crate::jwt::{self, decode_signing_key};
use anyhow::{bail, Context, Result};
use p256::ecdsa::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct IdTokenSigner {
    key: SigningKey,
    issuer: String,
    ttl: Duration,
}

impl fmt::Debug for IdTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdTokenSigner")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl IdTokenSigner {
    /// # Errors
    /// Returns an error if the issuer is empty.
    pub fn new(key: SigningKey, issuer: impl Into<String>, ttl: Duration) -> Result<Self> {
        let issuer = issuer.into();
        if issuer.is_empty() {
            bail!("missing id token issuer");
        }
        Ok(Self { key, issuer, ttl })
    }

    /// # Errors
    /// Returns an error if the PEM is not a P-256 key or the issuer is empty.
    pub fn from_pem(pem: &str, issuer: impl Into<String>, ttl: Duration) -> Result<Self> {
        let key = decode_signing_key(pem).context("invalid id token signing key")?;
        Self::new(key, issuer, ttl)
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.key.verifying_key()
    }

    /// Sign an id token for `user_id` addressed to `client_id`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(&self, user_id: Uuid, client_id: Uuid, now_unix: i64) -> Result<String> {
        let ttl = i64::try_from(self.ttl.as_secs()).context("id token ttl out of range")?;
        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            aud: client_id.to_string(),
            iat: now_unix,
            exp: now_unix + ttl,
        };
        jwt::sign_es256(&self.key, &claims).context("failed to sign id token")
    }
}
