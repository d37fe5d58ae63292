//! Process-local backend over a hash map.

use super::{Mutation, SessionStore, StoredSession};
use crate::attributes::Attributes;
use crate::id::SessionId;
use crate::session::Session;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tessera_core::{RequestContext, StoreError, StoreResult};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory session store.
/// Suitable for tests and single-process deployments; nothing survives a restart.
pub struct InMemorySessionStore {
    records: RwLock<HashMap<SessionId, StoredSession>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records, invalidated ones included.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` when no record is held.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Record key assigned to `id`, if a record exists.
    pub async fn record_id(&self, id: &SessionId) -> Option<Uuid> {
        self.records.read().await.get(id).map(|r| r.record_id)
    }

    async fn mutate(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        id: &SessionId,
        mutation: Mutation,
    ) -> StoreResult<Session> {
        ctx.check(operation)?;
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or(StoreError::NotFound)?;
        mutation.apply(&mut record.session, Utc::now());
        Ok(record.session.clone())
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, ctx: &RequestContext, session: &Session) -> StoreResult<Session> {
        ctx.check("save")?;
        let record = StoredSession::create(session, Utc::now());
        let mut records = self.records.write().await;
        records.insert(session.id.clone(), record);
        records
            .get(&session.id)
            .map(|r| r.session.clone())
            .ok_or(StoreError::NotFound)
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
