use crate::{
    cli::commands::serve::decode_key,
    login::LoginTokens,
    oauth::IdTokenSigner,
    onegate::{self, AppState, RateLimitConfig},
    secret::SecretHasher,
    session::SessionManager,
};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub base_url: Url,
    pub session_key: SecretString,
    pub url_login_key: SecretString,
    pub private_key: PathBuf,
    pub id_token_ttl_seconds: u64,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,
}

/// The issuer is the base URL without a trailing slash.
fn issuer(base_url: &Url) -> String {
    base_url.as_str().trim_end_matches('/').to_string()
}

fn log_startup_args(args: &Args) {
    debug!(
        port = args.port,
        base_url = %args.base_url,
        private_key = %args.private_key.display(),
        id_token_ttl_seconds = args.id_token_ttl_seconds,
        rate_limit_requests = args.rate_limit_requests,
        rate_limit_window_seconds = args.rate_limit_window_seconds,
        "Startup arguments"
    );
}

/// Execute the serve action.
/// # Errors
/// Returns an error if a key cannot be loaded, the database is unreachable, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let session_key = decode_key(args.session_key.expose_secret())
        .map_err(|err| anyhow!("invalid --session-key: {err}"))?;
    let url_login_key = decode_key(args.url_login_key.expose_secret())
        .map_err(|err| anyhow!("invalid --url-login-key: {err}"))?;

    let pem = tokio::fs::read_to_string(&args.private_key)
        .await
        .with_context(|| format!("failed to read {}", args.private_key.display()))?;
    let id_tokens = IdTokenSigner::from_pem(
        &pem,
        issuer(&args.base_url),
        Duration::from_secs(args.id_token_ttl_seconds),
    )?;
    let login = LoginTokens::new(url_login_key, &args.base_url)?;

    let store = super::connect(args.dsn.as_deref()).await?;

    let state = AppState::new(
        Arc::new(store),
        SessionManager::new(session_key),
        id_tokens,
        login,
        SecretHasher::default(),
    );
    let limits = RateLimitConfig::new()
        .with_requests(args.rate_limit_requests)
        .with_window(Duration::from_secs(args.rate_limit_window_seconds));

    info!(issuer = %issuer(&args.base_url), "Starting onegate");

    onegate::new(args.port, state, limits).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_drops_trailing_slash() {
        assert_eq!(
            issuer(&Url::parse("https://sso.example").unwrap()),
            "https://sso.example"
        );
        assert_eq!(
            issuer(&Url::parse("https://example.com/sso/").unwrap()),
            "https://example.com/sso"
        );
    }
}
