use crate::{
    oauth::AuthorizationError,
    onegate::AppState,
    storage::{Authorization, User},
};
use axum::{
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use tracing::{error, info, warn};
use url::Url;

#[utoipa::path(
    get,
    path = "/callback",
    responses(
        (status = 302, description = "Redirect to the client with `code` and `state`."),
        (status = 404, description = "No logged-in user or no pending authorization."),
    ),
    tag = "oauth"
)]
pub async fn callback(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<User>,
    authorization: Option<Extension<Authorization>>,
) -> Response {
    let Some(Extension(mut authorization)) = authorization else {
        info!(user = %user.id, "Callback without a pending authorization");
        return StatusCode::NOT_FOUND.into_response();
    };

    match state.authorizations().link(&mut authorization, user.id).await {
        Ok(()) => redirect_to_client(&authorization),
        Err(AuthorizationError::AlreadyLinked) => {
            warn!(
                authorization = %authorization.id,
                user = %user.id,
                "Authorization already linked"
            );
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) => {
            error!("Failed to link authorization: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// 302 to `redirect_uri?code=..&state=..`, keeping any query the client registered.
pub(crate) fn redirect_to_client(authorization: &Authorization) -> Response {
    let mut url = match Url::parse(&authorization.redirect_uri) {
        Ok(url) => url,
        Err(err) => {
            error!(
                authorization = %authorization.id,
                "Stored redirect URI is invalid: {err}"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    url.query_pairs_mut()
        .append_pair("code", &authorization.encoded_code())
        .append_pair("state", &authorization.state);

    (StatusCode::FOUND, [(LOCATION, url.to_string())]).into_response()
}
