use super::handlers::{health, login, oauth};
use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(title = "onegate", description = "Single sign-on with OAuth2 authorization code + PKCE"),
    paths(
        health::health,
        oauth::authorize::authorize_get,
        oauth::authorize::authorize_post,
        oauth::callback::callback,
        oauth::token::token,
        login::login_page,
        login::login_with_token,
    ),
    components(schemas(
        health::Health,
        login::LoginStatus,
        oauth::AuthorizeParams,
        oauth::ErrorBody,
        oauth::TokenRequest,
        oauth::TokenResponse,
    )),
    tags(
        (name = "oauth", description = "Authorization code flow"),
        (name = "login", description = "Session login"),
        (name = "health", description = "Service status"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}
