use crate::{
    login::LoginTokens,
    oauth::{Authorizations, ClientDirectory, IdTokenSigner},
    secret::SecretHasher,
    session::SessionManager,
    storage::Store,
};
use std::{sync::Arc, time::Duration};

pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 50;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    requests: u32,
    window: Duration,
}

impl RateLimitConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: DEFAULT_RATE_LIMIT_REQUESTS,
            window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS),
        }
    }

    #[must_use]
    pub fn with_requests(mut self, requests: u32) -> Self {
        self.requests = requests;
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn requests(&self) -> u32 {
        self.requests
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the handlers need, shared through an `Extension`.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    sessions: SessionManager,
    clients: ClientDirectory,
    authorizations: Authorizations,
    id_tokens: Arc<IdTokenSigner>,
    login: LoginTokens,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        sessions: SessionManager,
        id_tokens: IdTokenSigner,
        login: LoginTokens,
        hasher: SecretHasher,
    ) -> Self {
        Self {
            clients: ClientDirectory::new(store.clone(), hasher),
            authorizations: Authorizations::new(store.clone()),
            store,
            sessions,
            id_tokens: Arc::new(id_tokens),
            login,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn clients(&self) -> &ClientDirectory {
        &self.clients
    }

    #[must_use]
    pub fn authorizations(&self) -> &Authorizations {
        &self.authorizations
    }

    #[must_use]
    pub fn id_tokens(&self) -> &IdTokenSigner {
        &self.id_tokens
    }

    #[must_use]
    pub fn login(&self) -> &LoginTokens {
        &self.login
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_defaults_and_overrides() {
        let config = RateLimitConfig::default();
        assert_eq!(config.requests(), 50);
        assert_eq!(config.window(), Duration::from_secs(60));

        let config = config
            .with_requests(3)
            .with_window(Duration::from_secs(5));
        assert_eq!(config.requests(), 3);
        assert_eq!(config.window(), Duration::from_secs(5));
    }
}
