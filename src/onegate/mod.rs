use crate::{
    session::{self, bind, require},
    storage::{Authorization, Store, User},
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, field::Empty, info, info_span, Span};
use ulid::Ulid;

pub mod handlers;
pub mod openapi;
pub mod rate_limit;
mod state;


pub use state::{AppState, RateLimitConfig};

use handlers::{health, login, oauth};
use rate_limit::IpRateLimiter;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

const REQUEST_ID: &str = "x-request-id";

/// Build the application router.
///
/// Browser routes run behind the session cookie middleware and the
/// user/authorization bindings; `/token`, `/health` and `/openapi.json` do not
/// carry a session. The rate limiter sits in front of everything.
pub fn router(state: AppState, limits: RateLimitConfig) -> Router {
    let store: Arc<dyn Store> = state.store().clone();

    let browser = Router::new()
        .route(
            "/auth",
            get(oauth::authorize_get).post(oauth::authorize_post),
        )
        .route(
            "/callback",
            get(oauth::callback).layer(from_fn(require::<User>)),
        )
        .route(
            "/login",
            get(login::login_page).layer(from_fn(login::redirect_when_authenticated)),
        )
        .route("/login/:token", get(login::login_with_token))
        .layer(from_fn_with_state(store.clone(), bind::<Authorization>))
        .layer(from_fn_with_state(store, bind::<User>))
        .layer(from_fn_with_state(
            state.sessions().clone(),
            session::session,
        ));

    Router::new()
        .route("/token", post(oauth::token))
        .route("/health", get(health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .merge(browser)
        .layer(Extension(state))
        .layer(from_fn_with_state(
            Arc::new(IpRateLimiter::new(limits)),
            rate_limit::limit,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(port: u16, state: AppState, limits: RateLimitConfig) -> Result<()> {
    let app = router(state, limits);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id,
        session = Empty,
        user = Empty,
        authorization = Empty,
    )
}
