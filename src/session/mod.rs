//! Browser sessions: the signed token codec, the cookie middleware and the
//! generic entity binding that hangs session-scoped records off a request.

pub mod binding;
pub mod token;

use axum::{
    extract::{Request, State},
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretBox};
use std::sync::Arc;
use tracing::{debug, error, Span};

pub use binding::{bind, require, BindError, Bindable};
pub use token::{SessionToken, TokenError};

pub const SESSION_COOKIE_NAME: &str = "session";

/// Holds the server key and turns tokens into cookies and back.
#[derive(Debug, Clone)]
pub struct SessionManager {
    key: Arc<SecretBox<Vec<u8>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(key: Vec<u8>) -> Self {
        Self {
            key: Arc::new(SecretBox::new(Box::new(key))),
        }
    }

    /// Token from the request cookie, or `None` when absent or not authentic.
    #[must_use]
    pub fn resolve(&self, headers: &HeaderMap) -> Option<SessionToken> {
        let value = extract_session_cookie(headers)?;
        match SessionToken::decode(self.key.expose_secret(), &value) {
            Ok(token) => Some(token),
            Err(err) => {
                debug!("Discarding session cookie: {err}");
                None
            }
        }
    }

    /// `Set-Cookie` value carrying `token`.
    ///
    /// # Errors
    /// Returns an error if the token cannot be signed or is not a valid header value.
    pub fn cookie(&self, token: &SessionToken) -> anyhow::Result<HeaderValue> {
        let value = token.encode(self.key.expose_secret())?;
        Ok(session_cookie(&value)?)
    }
}

fn session_cookie(value: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Strict; Secure"
    ))
}

fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE_NAME && !value.is_empty()).then(|| value.to_string())
        })
}

/// Attach the request's `SessionToken`, minting a new one (and its cookie) when the
/// presented cookie is missing or fails verification.
pub async fn session(
    State(manager): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Response {
    let (token, fresh) = if let Some(token) = manager.resolve(request.headers()) {
        (token, false)
    } else {
        match SessionToken::initialize() {
            Ok(token) => (token, true),
            Err(err) => {
                error!("Failed to initialize session token: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    };

    Span::current().record("session", tracing::field::display(token.id()));
    request.extensions_mut().insert(token);

    let mut response = next.run(request).await;

    if fresh {
        match manager.cookie(&token) {
            Ok(cookie) => {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build session cookie: {err}"),
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware::from_fn_with_state, routing::get, Extension, Router};
    use tower::ServiceExt;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn app() -> Router {
        Router::new()
            .route(
                "/",
                get(|Extension(token): Extension<SessionToken>| async move {
                    token.id().to_string()
                }),
            )
            .layer(from_fn_with_state(SessionManager::new(KEY.to_vec()), session))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn cookie_value(response: &Response) -> String {
        let header = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        header
            .split(';')
            .next()
            .unwrap()
            .strip_prefix("session=")
            .unwrap()
            .to_string()
    }

    #[test]
    fn cookie_attributes() {
        let manager = SessionManager::new(KEY.to_vec());
        let token = SessionToken::initialize().unwrap();
        let cookie = manager.cookie(&token).unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("session="));
        for attribute in ["Path=/", "HttpOnly", "SameSite=Strict", "Secure"] {
            assert!(cookie.contains(attribute), "{cookie} lacks {attribute}");
        }
    }

    #[test]
    fn extracts_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session=abc; x=y"));
        assert_eq!(extract_session_cookie(&headers).as_deref(), Some("abc"));

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sessions=abc; session="));
        assert_eq!(extract_session_cookie(&headers), None);
    }

    #[tokio::test]
    async fn mints_cookie_for_new_visitors() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = cookie_value(&response);
        let token = SessionToken::decode(KEY, &cookie).unwrap();
        assert_eq!(body_string(response).await, token.id().to_string());
    }

    #[tokio::test]
    async fn keeps_valid_session() {
        let token = SessionToken::initialize().unwrap();
        let cookie = format!("session={}", token.encode(KEY).unwrap());

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(body_string(response).await, token.id().to_string());
    }

    #[tokio::test]
    async fn tampered_cookie_degrades_to_new_session() {
        let token = SessionToken::initialize().unwrap();
        let forged = token.encode(b"some other server key").unwrap();

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(COOKIE, format!("session={forged}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let minted = SessionToken::decode(KEY, &cookie_value(&response)).unwrap();
        assert_ne!(minted.id(), token.id());
        assert_eq!(body_string(response).await, minted.id().to_string());
    }
}
