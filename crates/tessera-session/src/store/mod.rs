//! Persistence contract and reference backends.
//!
//! A backend owns the authoritative timestamps: `save` stamps both
//! `created_at` and `last_accessed_at`, and every later call that touches a
//! record refreshes `last_accessed_at` with the backend's clock. Each
//! read-modify-write runs under a single lock or transaction so mutations of
//! the same id are serialised by the backend.

mod file;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use file::FileSessionStore;
pub use memory::InMemorySessionStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;

use crate::attributes::Attributes;
use crate::id::SessionId;
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_core::{RequestContext, StoreResult};
use uuid::Uuid;

/// Storage backend for sessions.
///
/// `NotFound` is reserved for "no record under this id" and is never
/// returned by [`SessionStore::invalidate`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a new record under a fresh record key and returns the stored
    /// copy with backend-assigned timestamps. A record already held under the
    /// same session id is replaced.
    async fn save(&self, ctx: &RequestContext, session: &Session) -> StoreResult<Session>;

    /// Replaces the mutable fields of an existing record and refreshes
    /// `last_accessed_at`. `created_at` is never touched.
    async fn update(&self, ctx: &RequestContext, session: &Session) -> StoreResult<Session>;

    /// Fetches a record and refreshes `last_accessed_at`.
    async fn load(&self, ctx: &RequestContext, id: &SessionId) -> StoreResult<Session>;

    /// Merges `attrs` into the record, overwriting equal keys.
    async fn add_attributes(
        &self,
        ctx: &RequestContext,
        id: &SessionId,
        attrs: Attributes,
    ) -> StoreResult<Session>;

    /// Deletes exactly the named keys. Unknown keys are ignored.
    async fn remove_attributes(
        &self,
        ctx: &RequestContext,
        id: &SessionId,
        keys: &[String],
    ) -> StoreResult<Session>;

    /// Marks the record inactive. Succeeds when no record exists.
    async fn invalidate(&self, ctx: &RequestContext, id: &SessionId) -> StoreResult<()>;
}

#[async_trait]
impl<S> SessionStore for Arc<S>
where
    S: SessionStore + ?Sized,
{
    async fn save(&self, ctx: &RequestContext, session: &Session) -> StoreResult<Session> {
        (**self).save(ctx, session).await
    }

    async fn update(&self, ctx: &RequestContext, session: &Session) -> StoreResult<Session> {
        (**self).update(ctx, session).await
    }

    async fn load(&self, ctx: &RequestContext, id: &SessionId) -> StoreResult<Session> {
        (**self).load(ctx, id).await
    }

    async fn add_attributes(
        &self,
        ctx: &RequestContext,
        id: &SessionId,
        attrs: Attributes,
    ) -> StoreResult<Session> {
        (**self).add_attributes(ctx, id, attrs).await
    }

    async fn remove_attributes(
        &self,
        ctx: &RequestContext,
        id: &SessionId,
        keys: &[String],
    ) -> StoreResult<Session> {
        (**self).remove_attributes(ctx, id, keys).await
    }

    async fn invalidate(&self, ctx: &RequestContext, id: &SessionId) -> StoreResult<()> {
        (**self).invalidate(ctx, id).await
    }
}

/// A session as held by a backend, keyed by a record id that the backend
/// assigns and that is unrelated to the session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Backend-assigned primary key.
    pub record_id: Uuid,
    /// The stored entity.
    pub session: Session,
}

impl StoredSession {
    /// A brand-new record for `session`, stamped at `now`.
    pub(crate) fn create(session: &Session, now: DateTime<Utc>) -> Self {
        let mut session = session.clone();
        session.created_at = now;
        session.last_accessed_at = now;
        Self {
            record_id: Uuid::new_v4(),
            session,
        }
    }
}

/// A read-modify-write step applied to an existing record.
#[derive(Debug, Clone)]
pub(crate) enum Mutation {
    Touch,
    Replace(Box<Session>),
    Add(Attributes),
    Remove(Vec<String>),
    Invalidate,
}

impl Mutation {
    /// Applies the step and refreshes `last_accessed_at`.
    pub(crate) fn apply(self, stored: &mut Session, now: DateTime<Utc>) {
        match self {
            Mutation::Touch => {}
            Mutation::Replace(incoming) => {
                let incoming = *incoming;
                stored.data = incoming.data;
                stored.cookie = incoming.cookie;
                stored.active = incoming.active;
                stored.anonymous = incoming.anonymous;
                stored.user_id = incoming.user_id;
                stored.idle_timeout = incoming.idle_timeout;
                stored.absolute_timeout = incoming.absolute_timeout;
            }
            Mutation::Add(attrs) => stored.set_attributes(attrs),
            Mutation::Remove(keys) => {
                for key in &keys {
                    stored.remove_attribute(key);
                }
            }
            Mutation::Invalidate => stored.active = false,
        }
        stored.last_accessed_at = now;
    }
}
