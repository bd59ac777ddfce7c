//! PostgreSQL store.

use super::{
    Authorization, AuthorizationStore, Client, ClientStore, ConsumeOutcome, LinkOutcome,
    NewAuthorization, PurgeScope, SessionPurge, SessionRecord, SessionStore, User, UserStore,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use std::time::Duration;
use tracing::{error, info_span, Instrument, Span};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const AUTHORIZATION_COLUMNS: &str = r"
    a.id, a.client_id, a.user_id, a.state, a.code, a.code_challenge, a.session_id,
    c.redirect_uri
";

fn query_span(operation: &str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn session_from_row(row: &PgRow) -> SessionRecord {
    SessionRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        created_at_unix: row.get("created_at_unix"),
        updated_at_unix: row.get("updated_at_unix"),
        deleted: row.get("deleted"),
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        created_at_unix: row.get("created_at_unix"),
    }
}

fn client_from_row(row: &PgRow) -> Client {
    Client {
        id: row.get("id"),
        description: row.get("description"),
        redirect_uri: row.get("redirect_uri"),
        secret_hash: row.get("secret_hash"),
        created_at_unix: row.get("created_at_unix"),
    }
}

fn authorization_from_row(row: &PgRow) -> Authorization {
    Authorization {
        id: row.get("id"),
        client_id: row.get("client_id"),
        user_id: row.get("user_id"),
        state: row.get("state"),
        code: row.get("code"),
        code_challenge: row.get("code_challenge"),
        session_id: row.get("session_id"),
        redirect_uri: row.get("redirect_uri"),
    }
}

/// SQL run by a session cleanup. `$1`, when present, is the inactivity window in seconds.
#[must_use]
pub fn purge_statement(purge: SessionPurge) -> String {
    let mut statement = match purge.scope {
        PurgeScope::SoftDelete => {
            "UPDATE sessions SET deleted_at = NOW() WHERE deleted_at IS NULL".to_string()
        }
        PurgeScope::DeletedOnly => "DELETE FROM sessions WHERE deleted_at IS NOT NULL".to_string(),
        PurgeScope::All => "DELETE FROM sessions WHERE TRUE".to_string(),
    };
    if purge.inactive_for_seconds.is_some() {
        statement.push_str(" AND updated_at < NOW() - ($1::BIGINT * INTERVAL '1 second')");
    }
    statement
}

/// Split the schema file into single statements, skipping comment-only lines.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');
        if trimmed.ends_with(';') {
            statements.push(current.trim().trim_end_matches(';').to_string());
            current.clear();
        }
    }

    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }

    statements
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Apply `sql/schema.sql`. Statements are idempotent.
    ///
    /// # Errors
    /// Returns an error naming the first statement that fails.
    pub async fn migrate(&self) -> Result<usize> {
        let statements = split_sql_statements(SCHEMA_SQL);
        for (index, statement) in statements.iter().enumerate() {
            sqlx::query(statement)
                .execute(&self.pool)
                .instrument(query_span("MIGRATE", statement))
                .await
                .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
        }
        Ok(statements.len())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn touch_session(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        let query = r"
            INSERT INTO sessions (id) VALUES ($1)
            ON CONFLICT (id) DO UPDATE SET updated_at = NOW()
                WHERE sessions.deleted_at IS NULL
            RETURNING id, user_id,
                EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
                EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at_unix,
                FALSE AS deleted
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPSERT", query))
            .await
            .context("failed to touch session")?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn login_session(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        let query = r"
            INSERT INTO sessions (id, user_id) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET user_id = EXCLUDED.user_id, updated_at = NOW()
                WHERE sessions.deleted_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(query_span("UPSERT", query))
            .await
            .context("failed to log in session")?;

        if result.rows_affected() == 0 {
            bail!("session {id} was deleted");
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let query = r"
            SELECT id, user_id,
                EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
                EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at_unix,
                deleted_at IS NOT NULL AS deleted
            FROM sessions
            ORDER BY updated_at DESC
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list sessions")?;

        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn purge_sessions(&self, purge: SessionPurge) -> Result<u64> {
        let statement = purge_statement(purge);
        let operation = match purge.scope {
            PurgeScope::SoftDelete => "UPDATE",
            PurgeScope::DeletedOnly | PurgeScope::All => "DELETE",
        };
        let mut query = sqlx::query(&statement);
        if let Some(seconds) = purge.inactive_for_seconds {
            query = query.bind(seconds);
        }
        let result = query
            .execute(&self.pool)
            .instrument(query_span(operation, &statement))
            .await
            .context("failed to purge sessions")?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, name: &str) -> Result<User> {
        let query = r"
            INSERT INTO users (id, name) VALUES ($1, $2)
            RETURNING id, name, EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix
        ";
        let row = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(name)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert user")?;

        Ok(user_from_row(&row))
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = r"
            SELECT id, name, EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup user")?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let query = r"
            SELECT id, name, EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix
            FROM users
            WHERE deleted_at IS NULL
            ORDER BY created_at
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list users")?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let query =
            "UPDATE users SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to delete user")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ClientStore for PgStore {
    async fn insert_client(&self, client: &Client) -> Result<()> {
        let query = r"
            INSERT INTO clients (id, description, redirect_uri, secret_hash)
            VALUES ($1, $2, $3, $4)
        ";
        sqlx::query(query)
            .bind(client.id)
            .bind(&client.description)
            .bind(&client.redirect_uri)
            .bind(&client.secret_hash)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert client")?;

        Ok(())
    }

    async fn client_by_id(&self, id: Uuid) -> Result<Option<Client>> {
        let query = r"
            SELECT id, description, redirect_uri, secret_hash,
                EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix
            FROM clients
            WHERE id = $1 AND deleted_at IS NULL
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup client")?;

        Ok(row.as_ref().map(client_from_row))
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        let query = r"
            SELECT id, description, redirect_uri, secret_hash,
                EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix
            FROM clients
            WHERE deleted_at IS NULL
            ORDER BY created_at
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list clients")?;

        Ok(rows.iter().map(client_from_row).collect())
    }

    async fn delete_client(&self, id: Uuid) -> Result<bool> {
        let query =
            "UPDATE clients SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to delete client")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuthorizationStore for PgStore {
    async fn insert_authorization(&self, authorization: &NewAuthorization) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin authorization transaction")?;

        let query = "DELETE FROM authorizations WHERE session_id = $1 AND consumed_at IS NULL";
        sqlx::query(query)
            .bind(authorization.session_id)
            .execute(&mut *tx)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to drop stale authorizations")?;

        let query = r"
            INSERT INTO authorizations
                (id, client_id, state, code, code_challenge, session_id)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        sqlx::query(query)
            .bind(authorization.id)
            .bind(authorization.client_id)
            .bind(&authorization.state)
            .bind(&authorization.code)
            .bind(&authorization.code_challenge)
            .bind(authorization.session_id)
            .execute(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert authorization")?;

        tx.commit()
            .await
            .context("commit authorization transaction")?;
        Ok(())
    }

    async fn authorization_by_session(&self, session_id: Uuid) -> Result<Option<Authorization>> {
        let query = format!(
            r"
            SELECT {AUTHORIZATION_COLUMNS}
            FROM authorizations a
            JOIN clients c ON c.id = a.client_id AND c.deleted_at IS NULL
            WHERE a.session_id = $1 AND a.consumed_at IS NULL
            ORDER BY a.created_at DESC
            LIMIT 1
            "
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup authorization by session")?;

        Ok(row.as_ref().map(authorization_from_row))
    }

    async fn authorization_by_code(&self, code: &[u8]) -> Result<Option<Authorization>> {
        let query = format!(
            r"
            SELECT {AUTHORIZATION_COLUMNS}
            FROM authorizations a
            JOIN clients c ON c.id = a.client_id AND c.deleted_at IS NULL
            WHERE a.code = $1 AND a.consumed_at IS NULL
            "
        );
        let row = sqlx::query(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup authorization by code")?;

        Ok(row.as_ref().map(authorization_from_row))
    }

    async fn link_authorization(&self, id: Uuid, user_id: Uuid) -> Result<LinkOutcome> {
        let query = r"
            UPDATE authorizations SET user_id = $2
            WHERE id = $1 AND user_id IS NULL AND consumed_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to link authorization")?;

        Ok(if result.rows_affected() == 0 {
            LinkOutcome::AlreadyLinked
        } else {
            LinkOutcome::Linked
        })
    }

    async fn consume_authorization(&self, id: Uuid) -> Result<ConsumeOutcome> {
        let query =
            "UPDATE authorizations SET consumed_at = NOW() WHERE id = $1 AND consumed_at IS NULL";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to mark authorization consumed")?;

        if result.rows_affected() == 0 {
            return Ok(ConsumeOutcome::AlreadyConsumed);
        }

        // The row is already unusable; a failed delete only leaves a tombstone behind.
        let query = "DELETE FROM authorizations WHERE id = $1";
        if let Err(err) = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
        {
            error!("Failed to delete consumed authorization {id}: {err}");
        }

        Ok(ConsumeOutcome::Consumed)
    }
}
