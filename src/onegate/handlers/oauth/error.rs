use axum::{
    http::{
        header::{CACHE_CONTROL, PRAGMA, WWW_AUTHENTICATE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

/// OAuth2 error vocabulary, plus the PKCE-specific codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OAuthError {
    #[error("invalid_request")]
    InvalidRequest(&'static str),
    #[error("invalid_client")]
    InvalidClient,
    #[error("invalid_grant")]
    InvalidGrant(&'static str),
    #[error("unsupported_response_type")]
    UnsupportedResponseType,
    #[error("missing_code_verifier")]
    MissingCodeVerifier,
    #[error("invalid_code_challenge")]
    InvalidCodeChallenge,
    #[error("server_error")]
    ServerError,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub error_description: String,
}

impl OAuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidClient => StatusCode::UNAUTHORIZED,
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequest(_)
            | Self::InvalidGrant(_)
            | Self::UnsupportedResponseType
            | Self::MissingCodeVerifier
            | Self::InvalidCodeChallenge => StatusCode::BAD_REQUEST,
        }
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidRequest(detail) | Self::InvalidGrant(detail) => detail,
            Self::InvalidClient => "client authentication failed",
            Self::UnsupportedResponseType => "only the code response type is supported",
            Self::MissingCodeVerifier => "code_verifier is required",
            Self::InvalidCodeChallenge => "code_verifier does not match code_challenge",
            Self::ServerError => "internal error",
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
            error_description: self.description().to_string(),
        };
        let mut response = (self.status(), Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        if self == Self::InvalidClient {
            headers.insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Basic realm="onegate""#),
            );
        }
        response
    }
}
