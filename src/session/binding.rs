//! Generic session-to-entity binding.
//!
//! `bind::<E>` looks up the `E` belonging to the current session token and stores
//! it in the request extensions. A miss is not an error: handlers treat a missing
//! extension as "not logged in" or "no pending authorization".

use super::SessionToken;
use crate::storage::{Store, User};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{fmt::Display, future::Future, sync::Arc};
use tracing::{error, info, Span};

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// A record that can be resolved from a session token.
pub trait Bindable: Clone + Send + Sync + 'static {
    /// Name used in logs and as the request span field.
    const KIND: &'static str;

    fn fetch(
        store: &dyn Store,
        token: SessionToken,
    ) -> impl Future<Output = Result<Self, BindError>> + Send;

    fn trace_id(&self) -> impl Display;
}

impl Bindable for User {
    const KIND: &'static str = "user";

    async fn fetch(store: &dyn Store, token: SessionToken) -> Result<Self, BindError> {
        let session = store
            .touch_session(token.id())
            .await?
            .ok_or(BindError::NotFound)?;
        let user_id = session.user_id.ok_or(BindError::NotFound)?;
        store
            .user_by_id(user_id)
            .await?
            .ok_or(BindError::NotFound)
    }

    fn trace_id(&self) -> impl Display {
        self.id
    }
}

pub async fn bind<E: Bindable>(
    State(store): State<Arc<dyn Store>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = request.extensions().get::<SessionToken>().copied() else {
        error!("{} binding requires the session middleware", E::KIND);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    match E::fetch(store.as_ref(), token).await {
        Ok(entity) => {
            Span::current().record(E::KIND, tracing::field::display(entity.trace_id()));
            request.extensions_mut().insert(entity);
        }
        Err(BindError::NotFound) => {
            info!(session = %token.id(), "No {} bound to session", E::KIND);
        }
        Err(BindError::Store(err)) => {
            error!("Failed to load {} for session: {err:#}", E::KIND);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    next.run(request).await
}

/// Answer 404 unless `bind::<E>` attached an `E`.
pub async fn require<E: Bindable>(request: Request, next: Next) -> Response {
    if request.extensions().get::<E>().is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}
