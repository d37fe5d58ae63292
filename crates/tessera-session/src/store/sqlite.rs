//! SQLite backend.
//!
//! One `sessions` table keyed by a UUID record id with a unique index on the
//! session id. Every operation is a single `IMMEDIATE` transaction run on the
//! blocking pool; a request cancelled or past its deadline before commit
//! rolls back.

use super::{Mutation, SessionStore, StoredSession};
use crate::attributes::Attributes;
use crate::id::SessionId;
use crate::session::{CookiePolicy, Session};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{RequestContext, StoreError, StoreResult};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    record_id           TEXT PRIMARY KEY,
    sid                 TEXT NOT NULL UNIQUE,
    data                TEXT NOT NULL,
    cookie              TEXT NOT NULL,
    anonymous           INTEGER NOT NULL,
    active              INTEGER NOT NULL,
    user_id             TEXT NOT NULL,
    idle_timeout_ns     INTEGER NOT NULL,
    absolute_timeout_ns INTEGER NOT NULL,
    last_accessed_at    TEXT NOT NULL,
    created_at          TEXT NOT NULL
);
";

/// Session store on a single SQLite connection.
#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    /// Opens or creates the database at `path` and ensures the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| StoreError::backend("open", e))?;
        Self::with_connection(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::backend("open", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::backend("migrate", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` inside one transaction on the blocking pool.
    async fn transact<T, F>(&self, ctx: &RequestContext, operation: &'static str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> StoreResult<T> + Send + 'static,
    {
        ctx.check(operation)?;
        let conn = Arc::clone(&self.conn);
        let ctx = ctx.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| StoreError::backend(operation, e))?;
            let out = f(&tx)?;
            // Dropping `tx` without committing rolls the work back.
            ctx.check(operation)?;
            tx.commit().map_err(|e| StoreError::backend(operation, e))?;
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::backend(operation, e))?
    }

    async fn mutate(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        id: &SessionId,
        mutation: Mutation,
    ) -> StoreResult<Session> {
        let id = id.clone();
        self.transact(ctx, operation, move |tx| {
            let mut record = select(tx, operation, &id)?.ok_or(StoreError::NotFound)?;
            mutation.apply(&mut record.session, Utc::now());
            put(tx, operation, &record)?;
            Ok(record.session)
        })
        .await
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save(&self, ctx: &RequestContext, session: &Session) -> StoreResult<Session> {
        let record = StoredSession::create(session, Utc::now());
        self.transact(ctx, "save", move |tx| {
            put(tx, "save", &record)?;
            select(tx, "save", &record.session.id)?
                .map(|r| r.session)
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn update(&self, ctx: &RequestContext, session: &Session) -> StoreResult<Session> {
        self.mutate(ctx, "update", &session.id, Mutation::Replace(Box::new(session.clone())))
            .await
    }

    async fn load(&self, ctx: &RequestContext, id: &SessionId) -> StoreResult<Session> {
        self.mutate(ctx, "load", id, Mutation::Touch).await
    }

    async fn add_attributes(
        &self,
        ctx: &RequestContext,
        id: &SessionId,
        attrs: Attributes,
    ) -> StoreResult<Session> {
        self.mutate(ctx, "add_attributes", id, Mutation::Add(attrs))
            .await
    }

    async fn remove_attributes(
        &self,
        ctx: &RequestContext,
        id: &SessionId,
        keys: &[String],
    ) -> StoreResult<Session> {
        self.mutate(ctx, "remove_attributes", id, Mutation::Remove(keys.to_vec()))
            .await
    }

    async fn invalidate(&self, ctx: &RequestContext, id: &SessionId) -> StoreResult<()> {
        match self.mutate(ctx, "invalidate", id, Mutation::Invalidate).await {
            Ok(_) | Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Column values exactly as read, decoded outside the row callback.
struct Row {
    record_id: String,
    sid: String,
    data: String,
    cookie: String,
    anonymous: bool,
    active: bool,
    user_id: String,
    idle_timeout_ns: i64,
    absolute_timeout_ns: i64,
    last_accessed_at: String,
    created_at: String,
}

fn select(
    tx: &Transaction<'_>,
    operation: &'static str,
    id: &SessionId,
) -> StoreResult<Option<StoredSession>> {
    let row = tx
        .query_row(
            "SELECT record_id, sid, data, cookie, anonymous, active, user_id,
                    idle_timeout_ns, absolute_timeout_ns, last_accessed_at, created_at
             FROM sessions WHERE sid = ?1",
            params![id.as_str()],
            |r| {
                Ok(Row {
                    record_id: r.get(0)?,
                    sid: r.get(1)?,
                    data: r.get(2)?,
                    cookie: r.get(3)?,
                    anonymous: r.get(4)?,
                    active: r.get(5)?,
                    user_id: r.get(6)?,
                    idle_timeout_ns: r.get(7)?,
                    absolute_timeout_ns: r.get(8)?,
                    last_accessed_at: r.get(9)?,
                    created_at: r.get(10)?,
                })
            },
        )
        .optional()
        .map_err(|e| StoreError::backend(operation, e))?;

    row.map(|row| decode(operation, row)).transpose()
}

fn decode(operation: &'static str, row: Row) -> StoreResult<StoredSession> {
    let record_id =
        Uuid::parse_str(&row.record_id).map_err(|e| StoreError::backend(operation, e))?;
    let id = SessionId::parse(&row.sid).map_err(|e| StoreError::backend(operation, e))?;
    let data: Attributes =
        serde_json::from_str(&row.data).map_err(|e| StoreError::serialization(operation, e))?;
    let cookie: CookiePolicy =
        serde_json::from_str(&row.cookie).map_err(|e| StoreError::serialization(operation, e))?;

    Ok(StoredSession {
        record_id,
        session: Session {
            id,
            data,
            cookie,
            anonymous: row.anonymous,
            active: row.active,
            user_id: row.user_id,
            idle_timeout: from_nanos(row.idle_timeout_ns),
            absolute_timeout: from_nanos(row.absolute_timeout_ns),
            last_accessed_at: parse_time(operation, &row.last_accessed_at)?,
            created_at: parse_time(operation, &row.created_at)?,
        },
    })
}

/// Inserts `record`, replacing any row with the same record id or session id.
fn put(tx: &Transaction<'_>, operation: &'static str, record: &StoredSession) -> StoreResult<()> {
    let s = &record.session;
    let data = serde_json::to_string(&s.data).map_err(|e| StoreError::serialization(operation, e))?;
    let cookie =
        serde_json::to_string(&s.cookie).map_err(|e| StoreError::serialization(operation, e))?;

    tx.execute(
        "INSERT OR REPLACE INTO sessions
            (record_id, sid, data, cookie, anonymous, active, user_id,
             idle_timeout_ns, absolute_timeout_ns, last_accessed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.record_id.to_string(),
            s.id.as_str(),
            data,
            cookie,
            s.anonymous,
            s.active,
            s.user_id,
            to_nanos(s.idle_timeout),
            to_nanos(s.absolute_timeout),
            format_time(s.last_accessed_at),
            format_time(s.created_at),
        ],
    )
    .map_err(|e| StoreError::backend(operation, e))?;
    Ok(())
}

/// Timeouts beyond ~292 years saturate.
fn to_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

fn from_nanos(n: i64) -> Duration {
    Duration::from_nanos(u64::try_from(n).unwrap_or(0))
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(operation: &'static str, s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::backend(operation, e))
}
