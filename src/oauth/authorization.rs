//! Pending OAuth2 authorization requests.
//!
//! `Created` (bound to a session) -> `Linked` (user set once) -> `Consumed` (gone).
//! Linking never overwrites a user, and a code can be exchanged at most once.

use crate::session::{BindError, Bindable, SessionToken};
use crate::storage::{
    Authorization, Client, ConsumeOutcome, LinkOutcome, NewAuthorization, Store,
};
use anyhow::Context;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::{fmt::Display, sync::Arc};
use uuid::Uuid;

pub const CODE_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Created,
    Linked,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("state must not be empty")]
    EmptyState,
    #[error("code challenge must not be empty")]
    EmptyCodeChallenge,
    #[error("authorization is already linked to a user")]
    AlreadyLinked,
    #[error("authorization was already consumed")]
    AlreadyConsumed,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl Authorization {
    #[must_use]
    pub fn status(&self) -> AuthorizationStatus {
        if self.user_id.is_some() {
            AuthorizationStatus::Linked
        } else {
            AuthorizationStatus::Created
        }
    }

    /// The code as it travels in the redirect and the token request.
    #[must_use]
    pub fn encoded_code(&self) -> String {
        Base64UrlUnpadded::encode_string(&self.code)
    }
}

/// Decode a `code` parameter; `None` for anything that cannot be a code.
#[must_use]
pub fn decode_code(code: &str) -> Option<Vec<u8>> {
    Base64UrlUnpadded::decode_vec(code.trim_end_matches('='))
        .ok()
        .filter(|bytes| bytes.len() == CODE_LEN)
}

impl Bindable for Authorization {
    const KIND: &'static str = "authorization";

    async fn fetch(store: &dyn Store, token: SessionToken) -> Result<Self, BindError> {
        store
            .authorization_by_session(token.id())
            .await?
            .ok_or(BindError::NotFound)
    }

    fn trace_id(&self) -> impl Display {
        self.id
    }
}

#[derive(Clone)]
pub struct Authorizations {
    store: Arc<dyn Store>,
}

impl Authorizations {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Start a request for `client` within `session`.
    ///
    /// # Errors
    /// Returns an error for an empty `state` or `code_challenge`, or a store failure.
    pub async fn create(
        &self,
        session: &SessionToken,
        client: &Client,
        state: &str,
        code_challenge: &str,
    ) -> Result<Authorization, AuthorizationError> {
        if state.is_empty() {
            return Err(AuthorizationError::EmptyState);
        }
        if code_challenge.is_empty() {
            return Err(AuthorizationError::EmptyCodeChallenge);
        }

        let mut code = vec![0u8; CODE_LEN];
        OsRng
            .try_fill_bytes(&mut code)
            .context("failed to generate authorization code")?;

        let new = NewAuthorization {
            id: Uuid::new_v4(),
            client_id: client.id,
            state: state.to_string(),
            code,
            code_challenge: code_challenge.to_string(),
            session_id: session.id(),
        };
        self.store.insert_authorization(&new).await?;

        Ok(Authorization {
            id: new.id,
            client_id: new.client_id,
            user_id: None,
            state: new.state,
            code: new.code,
            code_challenge: new.code_challenge,
            session_id: new.session_id,
            redirect_uri: client.redirect_uri.clone(),
        })
    }

    /// Bind the request to `user_id`. Fails, without changes, if a user is already set.
    ///
    /// # Errors
    /// Returns `AlreadyLinked` or a store failure.
    pub async fn link(
        &self,
        authorization: &mut Authorization,
        user_id: Uuid,
    ) -> Result<(), AuthorizationError> {
        if authorization.status() == AuthorizationStatus::Linked {
            return Err(AuthorizationError::AlreadyLinked);
        }
        match self
            .store
            .link_authorization(authorization.id, user_id)
            .await?
        {
            LinkOutcome::Linked => {
                authorization.user_id = Some(user_id);
                Ok(())
            }
            LinkOutcome::AlreadyLinked => Err(AuthorizationError::AlreadyLinked),
        }
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn by_code(&self, code: &[u8]) -> anyhow::Result<Option<Authorization>> {
        self.store.authorization_by_code(code).await
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn by_session(&self, session_id: Uuid) -> anyhow::Result<Option<Authorization>> {
        self.store.authorization_by_session(session_id).await
    }

    /// Invalidate the request so its code cannot be exchanged again.
    ///
    /// # Errors
    /// Returns `AlreadyConsumed` if another exchange got there first, or a store failure.
    pub async fn consume(&self, authorization: &Authorization) -> Result<(), AuthorizationError> {
        match self.store.consume_authorization(authorization.id).await? {
            ConsumeOutcome::Consumed => Ok(()),
            ConsumeOutcome::AlreadyConsumed => Err(AuthorizationError::AlreadyConsumed),
        }
    }
}
