//! In-memory store for tests. Mirrors the PostgreSQL semantics closely enough to
//! drive the handlers end to end.

use super::{
    Authorization, AuthorizationStore, Client, ClientStore, ConsumeOutcome, LinkOutcome,
    NewAuthorization, PurgeScope, SessionPurge, SessionRecord, SessionStore, User, UserStore,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredAuthorization {
    record: NewAuthorization,
    user_id: Option<Uuid>,
    consumed: bool,
    sequence: u64,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<Uuid, SessionRecord>,
    users: HashMap<Uuid, User>,
    deleted_users: Vec<Uuid>,
    clients: HashMap<Uuid, Client>,
    authorizations: HashMap<Uuid, StoredAuthorization>,
    sequence: u64,
    fail_deletes: bool,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    inner: Mutex<Inner>,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

impl MemoryStore {
    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Keep consumed authorizations around as if the physical delete failed.
    pub(crate) fn fail_deletes(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_deletes = true;
        }
    }

    pub(crate) fn authorization_count(&self) -> usize {
        self.lock().map_or(0, |inner| inner.authorizations.len())
    }

    pub(crate) fn session(&self, id: Uuid) -> Option<SessionRecord> {
        self.lock().ok()?.sessions.get(&id).cloned()
    }

    /// Age a session row for activity-window tests.
    pub(crate) fn set_session_updated_at(&self, id: Uuid, updated_at_unix: i64) {
        if let Ok(mut inner) = self.lock() {
            if let Some(session) = inner.sessions.get_mut(&id) {
                session.updated_at_unix = updated_at_unix;
            }
        }
    }

    fn resolve(inner: &Inner, stored: &StoredAuthorization) -> Option<Authorization> {
        let client = inner.clients.get(&stored.record.client_id)?;
        Some(Authorization {
            id: stored.record.id,
            client_id: stored.record.client_id,
            user_id: stored.user_id,
            state: stored.record.state.clone(),
            code: stored.record.code.clone(),
            code_challenge: stored.record.code_challenge.clone(),
            session_id: stored.record.session_id,
            redirect_uri: client.redirect_uri.clone(),
        })
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn touch_session(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        let mut inner = self.lock()?;
        let now = now_unix();
        let session = inner.sessions.entry(id).or_insert_with(|| SessionRecord {
            id,
            user_id: None,
            created_at_unix: now,
            updated_at_unix: now,
            deleted: false,
        });
        if session.deleted {
            return Ok(None);
        }
        session.updated_at_unix = now;
        Ok(Some(session.clone()))
    }

    async fn login_session(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        let mut inner = self.lock()?;
        let now = now_unix();
        let session = inner.sessions.entry(id).or_insert_with(|| SessionRecord {
            id,
            user_id: None,
            created_at_unix: now,
            updated_at_unix: now,
            deleted: false,
        });
        if session.deleted {
            bail!("session {id} was deleted");
        }
        session.user_id = Some(user_id);
        session.updated_at_unix = now;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let inner = self.lock()?;
        let mut sessions: Vec<_> = inner.sessions.values().cloned().collect();
        sessions.sort_by_key(|session| std::cmp::Reverse(session.updated_at_unix));
        Ok(sessions)
    }

    async fn purge_sessions(&self, purge: SessionPurge) -> Result<u64> {
        let mut inner = self.lock()?;
        let cutoff = purge
            .inactive_for_seconds
            .map(|seconds| now_unix() - seconds);
        let stale = |session: &SessionRecord| cutoff.map_or(true, |c| session.updated_at_unix < c);

        let mut affected = 0;
        match purge.scope {
            PurgeScope::SoftDelete => {
                for session in inner.sessions.values_mut() {
                    if !session.deleted && stale(session) {
                        session.deleted = true;
                        affected += 1;
                    }
                }
            }
            PurgeScope::DeletedOnly | PurgeScope::All => {
                let before = inner.sessions.len();
                let only_deleted = purge.scope == PurgeScope::DeletedOnly;
                inner
                    .sessions
                    .retain(|_, session| !((session.deleted || !only_deleted) && stale(session)));
                affected = before - inner.sessions.len();
            }
        }
        Ok(u64::try_from(affected)?)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, name: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at_unix: now_unix(),
        };
        self.lock()?.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let inner = self.lock()?;
        if inner.deleted_users.contains(&id) {
            return Ok(None);
        }
        Ok(inner.users.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let inner = self.lock()?;
        Ok(inner
            .users
            .values()
            .filter(|user| !inner.deleted_users.contains(&user.id))
            .cloned()
            .collect())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.lock()?;
        if !inner.users.contains_key(&id) || inner.deleted_users.contains(&id) {
            return Ok(false);
        }
        inner.deleted_users.push(id);
        Ok(true)
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn insert_client(&self, client: &Client) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.clients.contains_key(&client.id) {
            bail!("client {} already exists", client.id);
        }
        inner.clients.insert(client.id, client.clone());
        Ok(())
    }

    async fn client_by_id(&self, id: Uuid) -> Result<Option<Client>> {
        Ok(self.lock()?.clients.get(&id).cloned())
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        Ok(self.lock()?.clients.values().cloned().collect())
    }

    async fn delete_client(&self, id: Uuid) -> Result<bool> {
        Ok(self.lock()?.clients.remove(&id).is_some())
    }
}

#[async_trait]
impl AuthorizationStore for MemoryStore {
    async fn insert_authorization(&self, authorization: &NewAuthorization) -> Result<()> {
        let mut inner = self.lock()?;
        if inner
            .authorizations
            .values()
            .any(|stored| stored.record.code == authorization.code)
        {
            bail!("duplicate authorization code");
        }
        inner.authorizations.retain(|_, stored| {
            stored.consumed || stored.record.session_id != authorization.session_id
        });
        inner.sequence += 1;
        let sequence = inner.sequence;
        inner.authorizations.insert(
            authorization.id,
            StoredAuthorization {
                record: authorization.clone(),
                user_id: None,
                consumed: false,
                sequence,
            },
        );
        Ok(())
    }

    async fn authorization_by_session(&self, session_id: Uuid) -> Result<Option<Authorization>> {
        let inner = self.lock()?;
        Ok(inner
            .authorizations
            .values()
            .filter(|stored| !stored.consumed && stored.record.session_id == session_id)
            .max_by_key(|stored| stored.sequence)
            .and_then(|stored| Self::resolve(&inner, stored)))
    }

    async fn authorization_by_code(&self, code: &[u8]) -> Result<Option<Authorization>> {
        let inner = self.lock()?;
        Ok(inner
            .authorizations
            .values()
            .find(|stored| !stored.consumed && stored.record.code == code)
            .and_then(|stored| Self::resolve(&inner, stored)))
    }

    async fn link_authorization(&self, id: Uuid, user_id: Uuid) -> Result<LinkOutcome> {
        let mut inner = self.lock()?;
        match inner.authorizations.get_mut(&id) {
            Some(stored) if !stored.consumed && stored.user_id.is_none() => {
                stored.user_id = Some(user_id);
                Ok(LinkOutcome::Linked)
            }
            _ => Ok(LinkOutcome::AlreadyLinked),
        }
    }

    async fn consume_authorization(&self, id: Uuid) -> Result<ConsumeOutcome> {
        let mut inner = self.lock()?;
        let fail_deletes = inner.fail_deletes;
        match inner.authorizations.get_mut(&id) {
            Some(stored) if !stored.consumed => stored.consumed = true,
            _ => return Ok(ConsumeOutcome::AlreadyConsumed),
        }
        if !fail_deletes {
            inner.authorizations.remove(&id);
        }
        Ok(ConsumeOutcome::Consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: i64 = 7_200;

    #[tokio::test]
    async fn activity_window_drives_list_and_purge() {
        let store = MemoryStore::default();
        let fresh = Uuid::new_v4();
        let aging = Uuid::new_v4();
        let stale = Uuid::new_v4();
        for id in [fresh, aging, stale] {
            store.touch_session(id).await.unwrap();
        }
        let now = now_unix();
        store.set_session_updated_at(aging, now - WINDOW + 60);
        store.set_session_updated_at(stale, now - WINDOW - 60);

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 3);
        let active = |id: Uuid| {
            sessions
                .iter()
                .find(|session| session.id == id)
                .is_some_and(|session| session.is_active(now, WINDOW))
        };
        assert!(active(fresh));
        assert!(active(aging));
        assert!(!active(stale));

        let affected = store
            .purge_sessions(SessionPurge {
                scope: PurgeScope::SoftDelete,
                inactive_for_seconds: Some(WINDOW),
            })
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert!(store.session(stale).is_some_and(|session| session.deleted));
        assert!(store.session(aging).is_some_and(|session| !session.deleted));
        assert_eq!(store.touch_session(stale).await.unwrap(), None);
    }
}
