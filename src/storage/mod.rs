//! Persistence seam.
//!
//! Handlers and domain services talk to `dyn Store`; `postgres` is the production
//! implementation and `memory` backs the unit and router tests.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[cfg(test)]
pub(crate) mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub created_at_unix: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub created_at_unix: i64,
    pub updated_at_unix: i64,
    pub deleted: bool,
}

impl SessionRecord {
    /// Whether the session was touched within `active_for_seconds` of `now_unix`.
    #[must_use]
    pub fn is_active(&self, now_unix: i64, active_for_seconds: i64) -> bool {
        !self.deleted && self.updated_at_unix >= now_unix - active_for_seconds
    }
}

/// OAuth2 relying party registration. `secret_hash` is a PHC string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: Uuid,
    pub description: String,
    pub redirect_uri: String,
    pub secret_hash: String,
    pub created_at_unix: i64,
}

/// Pending or linked authorization request. `redirect_uri` comes from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub id: Uuid,
    pub client_id: Uuid,
    pub user_id: Option<Uuid>,
    pub state: String,
    pub code: Vec<u8>,
    pub code_challenge: String,
    pub session_id: Uuid,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuthorization {
    pub id: Uuid,
    pub client_id: Uuid,
    pub state: String,
    pub code: Vec<u8>,
    pub code_challenge: String,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    AlreadyLinked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed,
    AlreadyConsumed,
}

/// Which session rows a cleanup run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeScope {
    /// Set `deleted_at` on live rows.
    SoftDelete,
    /// Remove rows that were soft-deleted earlier.
    DeletedOnly,
    /// Remove every row.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPurge {
    pub scope: PurgeScope,
    /// Restrict to rows not updated within this many seconds.
    pub inactive_for_seconds: Option<i64>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// First-or-create the session row and bump `updated_at`.
    /// Returns `None` if the row exists but was soft-deleted.
    async fn touch_session(&self, id: Uuid) -> Result<Option<SessionRecord>>;
    async fn login_session(&self, id: Uuid, user_id: Uuid) -> Result<()>;
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>>;
    async fn purge_sessions(&self, purge: SessionPurge) -> Result<u64>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, name: &str) -> Result<User>;
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn delete_user(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn insert_client(&self, client: &Client) -> Result<()>;
    async fn client_by_id(&self, id: Uuid) -> Result<Option<Client>>;
    async fn list_clients(&self) -> Result<Vec<Client>>;
    async fn delete_client(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Insert a new request, dropping older unconsumed ones of the same session.
    async fn insert_authorization(&self, authorization: &NewAuthorization) -> Result<()>;
    async fn authorization_by_session(&self, session_id: Uuid) -> Result<Option<Authorization>>;
    async fn authorization_by_code(&self, code: &[u8]) -> Result<Option<Authorization>>;
    /// Set `user_id` only if it is still unset.
    async fn link_authorization(&self, id: Uuid, user_id: Uuid) -> Result<LinkOutcome>;
    /// Mark consumed, then delete best-effort.
    async fn consume_authorization(&self, id: Uuid) -> Result<ConsumeOutcome>;
}

pub trait Store: SessionStore + UserStore + ClientStore + AuthorizationStore {}

impl<T> Store for T where T: SessionStore + UserStore + ClientStore + AuthorizationStore {}
