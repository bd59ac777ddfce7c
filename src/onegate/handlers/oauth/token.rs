use super::error::{ErrorBody, OAuthError};
use crate::{
    oauth::{authorization::decode_code, pkce, AuthorizationError},
    onegate::AppState,
    storage::{Authorization, Client},
};
use axum::{
    extract::{rejection::FormRejection, Form},
    http::{
        header::{AUTHORIZATION, CACHE_CONTROL, PRAGMA},
        HeaderMap,
    },
    response::{IntoResponse, Json, Response},
    Extension,
};
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
const ACCESS_TOKEN_LEN: usize = 32;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub id_token: String,
}

#[derive(Debug, PartialEq, Eq)]
struct Credentials {
    client_id: String,
    client_secret: String,
}

/// Credentials from an `Authorization: Basic` header. Both parts are
/// form-url-encoded before base64, so they are decoded again here.
fn basic_credentials(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = Base64::decode_vec(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some(Credentials {
        client_id: form_decode(id)?,
        client_secret: form_decode(secret)?,
    })
}

fn form_decode(value: &str) -> Option<String> {
    urlencoding::decode(&value.replace('+', " "))
        .ok()
        .map(|decoded| decoded.into_owned())
}

fn credentials(headers: &HeaderMap, request: &TokenRequest) -> Option<Credentials> {
    basic_credentials(headers).or_else(|| {
        Some(Credentials {
            client_id: request.client_id.clone()?,
            client_secret: request.client_secret.clone()?,
        })
    })
}

async fn authenticate_client(
    state: &AppState,
    credentials: Option<Credentials>,
) -> Result<Client, OAuthError> {
    let credentials = credentials.ok_or(OAuthError::InvalidClient)?;
    let client_id =
        Uuid::parse_str(&credentials.client_id).map_err(|_| OAuthError::InvalidClient)?;
    let client = state
        .clients()
        .by_id(client_id)
        .await
        .map_err(|err| {
            error!("Failed to load client: {err:#}");
            OAuthError::ServerError
        })?
        .ok_or(OAuthError::InvalidClient)?;

    client
        .verify_secret(&credentials.client_secret)
        .map_err(|_| {
            debug!(client = %client.id, "Client secret rejected");
            OAuthError::InvalidClient
        })?;
    Ok(client)
}

/// Look the code up and invalidate it before any other check runs.
async fn redeem_code(state: &AppState, code: Option<&str>) -> Result<Authorization, OAuthError> {
    let code = code.and_then(decode_code).ok_or(OAuthError::InvalidClient)?;
    let authorization = state
        .authorizations()
        .by_code(&code)
        .await
        .map_err(|err| {
            error!("Failed to load authorization: {err:#}");
            OAuthError::ServerError
        })?
        .ok_or(OAuthError::InvalidClient)?;

    match state.authorizations().consume(&authorization).await {
        Ok(()) => Ok(authorization),
        Err(AuthorizationError::AlreadyConsumed) => {
            warn!(authorization = %authorization.id, "Authorization code reused");
            Err(OAuthError::InvalidClient)
        }
        Err(err) => {
            error!("Failed to consume authorization: {err:#}");
            Err(OAuthError::ServerError)
        }
    }
}

async fn exchange(
    state: &AppState,
    headers: &HeaderMap,
    request: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let client = authenticate_client(state, credentials(headers, &request)).await?;
    let authorization = redeem_code(state, request.code.as_deref()).await?;

    if request.grant_type.as_deref() != Some(GRANT_TYPE_AUTHORIZATION_CODE) {
        return Err(OAuthError::InvalidGrant("unsupported grant_type"));
    }
    if authorization.client_id != client.id {
        warn!(
            authorization = %authorization.id,
            client = %client.id,
            "Code presented by a different client"
        );
        return Err(OAuthError::InvalidClient);
    }

    let verifier = request
        .code_verifier
        .as_deref()
        .filter(|verifier| !verifier.is_empty())
        .ok_or(OAuthError::MissingCodeVerifier)?;
    if !pkce::verify_s256(verifier, &authorization.code_challenge) {
        return Err(OAuthError::InvalidCodeChallenge);
    }

    let user_id = authorization
        .user_id
        .ok_or(OAuthError::InvalidGrant("authorization is not linked to a user"))?;
    if let Some(redirect_uri) = request.redirect_uri.as_deref() {
        if redirect_uri != authorization.redirect_uri {
            return Err(OAuthError::InvalidGrant("redirect_uri mismatch"));
        }
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| OAuthError::ServerError)?
        .as_secs();
    let now = i64::try_from(now).map_err(|_| OAuthError::ServerError)?;
    let id_token = state
        .id_tokens()
        .issue(user_id, client.id, now)
        .map_err(|err| {
            error!("Failed to sign id token: {err:#}");
            OAuthError::ServerError
        })?;

    let mut access_token = [0u8; ACCESS_TOKEN_LEN];
    OsRng.try_fill_bytes(&mut access_token).map_err(|err| {
        error!("Failed to generate access token: {err}");
        OAuthError::ServerError
    })?;

    info!(client = %client.id, user = %user_id, "Issued tokens");

    Ok(TokenResponse {
        access_token: Base64UrlUnpadded::encode_string(&access_token),
        token_type: "Bearer".to_string(),
        expires_in: state.id_tokens().ttl().as_secs(),
        id_token,
    })
}

#[utoipa::path(
    post,
    path = "/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Tokens issued.", body = TokenResponse),
        (status = 400, description = "Invalid request, grant or PKCE verifier.", body = ErrorBody),
        (status = 401, description = "Client authentication failed.", body = ErrorBody),
        (status = 500, description = "Storage or signing failure.", body = ErrorBody),
    ),
    tag = "oauth"
)]
pub async fn token(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let request = match form {
        Ok(Form(request)) => request,
        Err(rejection) => {
            debug!("Rejected token request body: {rejection}");
            return OAuthError::InvalidRequest("malformed token request").into_response();
        }
    };

    match exchange(&state, &headers, request).await {
        Ok(response) => (
            [(CACHE_CONTROL, "no-store"), (PRAGMA, "no-cache")],
            Json(response),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
