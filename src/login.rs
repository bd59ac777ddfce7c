//! Signed login links for operator-driven recovery.
//!
//! `issue` produces `<base-url>/login/<jwt>`; the JWT is HS256 over
//! `{sub, exp, jti}` and is accepted up to `LEEWAY_SECONDS` past `exp`.

use crate::jwt;
use anyhow::{Context, Result};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use url::Url;
use uuid::Uuid;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
pub const LEEWAY_SECONDS: i64 = 30;
const JTI_LEN: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginClaims {
    pub sub: String,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginTokenError {
    #[error(transparent)]
    Jwt(#[from] jwt::Error),
    #[error("login token expired")]
    Expired,
    #[error("invalid subject: {0}")]
    InvalidSubject(String),
}

#[derive(Debug, Clone)]
pub struct LoginTokens {
    key: Arc<SecretBox<Vec<u8>>>,
    base_url: Url,
}

impl LoginTokens {
    /// `base_url` is the service root; links are issued under its `/login/` path.
    ///
    /// # Errors
    /// Returns an error if `base_url` cannot carry a path.
    pub fn new(key: Vec<u8>, base_url: &Url) -> Result<Self> {
        let shown = base_url.to_string();
        let mut base_url = base_url.clone();
        base_url
            .path_segments_mut()
            .map_err(|()| anyhow::anyhow!("base URL cannot be a base: {shown}"))?
            .pop_if_empty()
            .push("login")
            .push("");
        Ok(Self {
            key: Arc::new(SecretBox::new(Box::new(key))),
            base_url,
        })
    }

    /// Login link for `user_id`, valid for `ttl`.
    ///
    /// # Errors
    /// Returns an error if the token cannot be signed or joined onto the base URL.
    pub fn issue(&self, user_id: Uuid, ttl: Duration, now_unix: i64) -> Result<Url> {
        let jti: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(JTI_LEN)
            .map(char::from)
            .collect();
        let claims = LoginClaims {
            sub: user_id.to_string(),
            exp: now_unix + i64::try_from(ttl.as_secs()).context("login ttl out of range")?,
            jti,
        };
        let token = jwt::sign_hs256(self.key.expose_secret(), &claims)
            .context("failed to sign login token")?;
        self.base_url
            .join(&token)
            .context("failed to build login URL")
    }

    /// Validate a token from a login link and return the user it names.
    ///
    /// # Errors
    /// Returns an error for a bad signature, a foreign algorithm, expiry or a bad subject.
    pub fn verify(&self, token: &str, now_unix: i64) -> Result<Uuid, LoginTokenError> {
        let claims: LoginClaims = jwt::verify_hs256(token, self.key.expose_secret())?;
        if claims.exp + LEEWAY_SECONDS < now_unix {
            return Err(LoginTokenError::Expired);
        }
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| LoginTokenError::InvalidSubject(claims.sub.clone()))?;
        if user_id.is_nil() {
            return Err(LoginTokenError::InvalidSubject(claims.sub));
        }
        Ok(user_id)
    }
}
