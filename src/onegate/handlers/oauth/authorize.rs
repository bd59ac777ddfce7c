use super::error::{ErrorBody, OAuthError};
use crate::{
    oauth::{pkce, AuthorizationError},
    onegate::AppState,
    session::SessionToken,
};
use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        Form, Query,
    },
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use serde::Deserialize;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    /// Must be `code`.
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    /// Echoed back to the client on redirect.
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    /// Must be `S256`.
    pub code_challenge_method: Option<String>,
    /// Optional; must equal the registered redirect URI when present.
    pub redirect_uri: Option<String>,
}

#[utoipa::path(
    get,
    path = "/auth",
    params(AuthorizeParams),
    responses(
        (status = 303, description = "Authorization request stored, continue at the login page."),
        (status = 400, description = "Invalid authorization request.", body = ErrorBody),
        (status = 500, description = "Storage failure.", body = ErrorBody),
    ),
    tag = "oauth"
)]
pub async fn authorize_get(
    Extension(state): Extension<AppState>,
    Extension(session): Extension<SessionToken>,
    query: Result<Query<AuthorizeParams>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(params)) => authorize(&state, &session, params).await,
        Err(rejection) => malformed(&rejection),
    }
}

#[utoipa::path(
    post,
    path = "/auth",
    request_body(content = AuthorizeParams, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Authorization request stored, continue at the login page."),
        (status = 400, description = "Invalid authorization request.", body = ErrorBody),
        (status = 500, description = "Storage failure.", body = ErrorBody),
    ),
    tag = "oauth"
)]
pub async fn authorize_post(
    Extension(state): Extension<AppState>,
    Extension(session): Extension<SessionToken>,
    form: Result<Form<AuthorizeParams>, FormRejection>,
) -> Response {
    match form {
        Ok(Form(params)) => authorize(&state, &session, params).await,
        Err(rejection) => malformed(&rejection),
    }
}

fn malformed(rejection: &dyn std::fmt::Display) -> Response {
    debug!("Rejected authorization request: {rejection}");
    OAuthError::InvalidRequest("malformed authorization request").into_response()
}

async fn authorize(state: &AppState, session: &SessionToken, params: AuthorizeParams) -> Response {
    match start_authorization(state, session, params).await {
        Ok(()) => Redirect::to(LOGIN_PATH).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn start_authorization(
    state: &AppState,
    session: &SessionToken,
    params: AuthorizeParams,
) -> Result<(), OAuthError> {
    if params.response_type.as_deref() != Some("code") {
        return Err(OAuthError::UnsupportedResponseType);
    }
    if params.code_challenge_method.as_deref() != Some(pkce::S256) {
        return Err(OAuthError::InvalidRequest(
            "code_challenge_method must be S256",
        ));
    }

    let client_id = params
        .client_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or(OAuthError::InvalidRequest("unknown client_id"))?;
    let client = state
        .clients()
        .by_id(client_id)
        .await
        .map_err(|err| {
            error!("Failed to load client: {err:#}");
            OAuthError::ServerError
        })?
        .ok_or(OAuthError::InvalidRequest("unknown client_id"))?;

    if let Some(redirect_uri) = params.redirect_uri.as_deref() {
        if redirect_uri != client.redirect_uri {
            return Err(OAuthError::InvalidRequest("redirect_uri mismatch"));
        }
    }

    let authorization = state
        .authorizations()
        .create(
            session,
            &client,
            params.state.as_deref().unwrap_or_default(),
            params.code_challenge.as_deref().unwrap_or_default(),
        )
        .await
        .map_err(|err| match err {
            AuthorizationError::EmptyState => OAuthError::InvalidRequest("state is required"),
            AuthorizationError::EmptyCodeChallenge => {
                OAuthError::InvalidRequest("code_challenge is required")
            }
            err => {
                error!("Failed to create authorization: {err:#}");
                OAuthError::ServerError
            }
        })?;

    info!(
        authorization = %authorization.id,
        client = %client.id,
        "Authorization request created"
    );
    Ok(())
}
