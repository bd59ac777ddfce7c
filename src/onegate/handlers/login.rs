//! Login landing page, the already-authenticated guard in front of it, and
//! the signed login links issued by `onegate user login`.

use super::oauth::callback::redirect_to_client;
use crate::{
    onegate::AppState,
    session::SessionToken,
    storage::{Authorization, User},
};
use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{Path, Request},
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
    Extension,
};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const CALLBACK_PATH: &str = "/callback";

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginStatus {
    pub login_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Uuid>,
}

/// Skip the login page when the session is already authenticated and has a
/// pending authorization: linked ones go straight back to the client,
/// unlinked ones continue at the callback.
pub async fn redirect_when_authenticated(request: Request, next: Next) -> Response {
    let user = request.extensions().get::<User>().map(|user| user.id);
    let authorization = request.extensions().get::<Authorization>().cloned();

    match (user, authorization) {
        (Some(user_id), Some(authorization)) if authorization.user_id == Some(user_id) => {
            debug!(authorization = %authorization.id, "Already linked, redirecting to client");
            redirect_to_client(&authorization)
        }
        (Some(_), Some(authorization)) if authorization.user_id.is_none() => {
            Redirect::to(CALLBACK_PATH).into_response()
        }
        _ => next.run(request).await,
    }
}

#[utoipa::path(
    get,
    path = "/login",
    responses(
        (status = 200, description = "Login state of the current session.", body = LoginStatus),
        (status = 302, description = "Authenticated with a linked authorization, back to the client."),
        (status = 303, description = "Authenticated with a pending authorization, continue at the callback."),
    ),
    tag = "login"
)]
pub async fn login_page(user: Option<Extension<User>>) -> Json<LoginStatus> {
    let user = user.map(|Extension(user)| user.id);
    Json(LoginStatus {
        login_required: user.is_none(),
        user,
    })
}

#[utoipa::path(
    get,
    path = "/login/{token}",
    params(("token" = String, Path, description = "Signed login token.")),
    responses(
        (status = 303, description = "Always redirects to the login page."),
    ),
    tag = "login"
)]
pub async fn login_with_token(
    Extension(state): Extension<AppState>,
    Extension(session): Extension<SessionToken>,
    Path(token): Path<String>,
) -> Redirect {
    if let Err(reason) = login(&state, &session, &token).await {
        warn!(session = %session.id(), "Login link rejected: {reason:#}");
    }
    Redirect::to(super::oauth::LOGIN_PATH)
}

async fn login(state: &AppState, session: &SessionToken, token: &str) -> Result<()> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let user_id = state.login().verify(token, i64::try_from(now)?)?;

    let user = state
        .store()
        .user_by_id(user_id)
        .await?
        .ok_or_else(|| anyhow!("unknown user {user_id}"))?;

    state
        .store()
        .login_session(session.id(), user.id)
        .await
        .context("failed to log in session")?;

    info!(session = %session.id(), user = %user.id, "Session logged in");
    Ok(())
}
