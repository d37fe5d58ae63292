use super::{Mutation, SessionStore, StoredSession};
use crate::attributes::Attributes;
use crate::id::SessionId;
use crate::session::Session;
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::{RequestContext, StoreError, StoreResult};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// File-based session store: one JSON document per session, named after the
/// session id.
///
/// Every operation holds an internal mutex for its whole read-modify-write.
/// That critical section runs on its own task, so a caller that gives up
/// (cancelled or past its deadline) never releases the lock while a write is
/// still in flight. Documents are written to a temporary file unique to the
/// write and renamed into place, and the request is checked once more just
/// before the rename: an aborted request leaves the previous document intact.
pub struct FileSessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub async fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::backend("open", e))?;
        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                lock: Mutex::new(()),
            }),
        })
    }

    /// Directory holding the session documents.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Ids of every stored session, invalidated ones included, sorted.
    pub async fn ids(&self, ctx: &RequestContext) -> StoreResult<Vec<SessionId>> {
        ctx.check("list")?;
        let mut entries = tokio::fs::read_dir(self.dir())
            .await
            .map_err(|e| StoreError::backend("list", e))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::backend("list", e))?
        {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            match SessionId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(e) => debug!(file = stem, error = %e, "skipping foreign file"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Stored record for `id`, including its record key. Does not refresh
    /// `last_accessed_at`.
    pub async fn record(&self, ctx: &RequestContext, id: &SessionId) -> StoreResult<StoredSession> {
        ctx.check("record")?;
        let _guard = self.inner.lock.lock().await;
        self.inner.read("record", id).await
    }

    /// Runs `step` under the store lock on a detached task and waits for it.
    async fn locked<F, Fut>(&self, operation: &'static str, step: F) -> StoreResult<Session>
    where
        F: FnOnce(Arc<Inner>) -> Fut,
        Fut: std::future::Future<Output = StoreResult<Session>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let fut = step(Arc::clone(&inner));
        tokio::spawn(async move {
            let _guard = inner.lock.lock().await;
            fut.await
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
        ctx.check(operation)?;
        let ctx = ctx.clone();
        let id = id.clone();
        self.locked(operation, move |inner| async move {
            let mut record = inner.read(operation, &id).await?;
            mutation.apply(&mut record.session, Utc::now());
            inner.commit(&ctx, operation, &record).await?;
            Ok(record.session)
        })
        .await
    }
}

impl Inner {
    fn session_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read(&self, operation: &'static str, id: &SessionId) -> StoreResult<StoredSession> {
        let data = match tokio::fs::read(self.session_path(id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(e) => return Err(StoreError::backend(operation, e)),
        };
        serde_json::from_slice(&data).map_err(|e| StoreError::serialization(operation, e))
    }

    /// Replaces the document for `record`, unless `ctx` was cancelled or
    /// expired before the rename.
    async fn commit(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        record: &StoredSession,
    ) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::serialization(operation, e))?;
        // Nothing reaches the disk unless it reads back.
        serde_json::from_slice::<StoredSession>(&json)
            .map_err(|e| StoreError::serialization(operation, e))?;

        let id = &record.session.id;
        let tmp = self.dir.join(format!("{id}.{}.tmp", Uuid::new_v4()));
        let written = match tokio::fs::write(&tmp, json).await {
            Ok(()) => ctx.check(operation),
            Err(e) => Err(StoreError::backend(operation, e)),
        };
        let result = match written {
            Ok(()) => tokio::fs::rename(&tmp, self.session_path(id))
                .await
                .map_err(|e| StoreError::backend(operation, e)),
            Err(e) => Err(e),
        };
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(&tmp).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(file = %tmp.display(), error = %e, "failed to remove temporary file");
                }
            }
        }
        result
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, ctx: &RequestContext, session: &Session) -> StoreResult<Session> {
        ctx.check("save")?;
        let ctx = ctx.clone();
        let record = StoredSession::create(session, Utc::now());
        self.locked("save", move |inner| async move {
            inner.commit(&ctx, "save", &record).await?;
            Ok(record.session)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeValue;

    #[tokio::test]
    async fn records_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RequestContext::new();
        let mut session = Session::new().unwrap();
        session.set_attribute("n", 8i32);

        let saved = {
            let store = FileSessionStore::new(tmp.path()).await.unwrap();
            store.save(&ctx, &session).await.unwrap()
        };

        let store = FileSessionStore::new(tmp.path()).await.unwrap();
        let loaded = store.load(&ctx, &session.id).await.unwrap();
        assert_eq!(loaded.created_at, saved.created_at);
        assert!(loaded.last_accessed_at >= saved.last_accessed_at);
        // The exact kind survives the JSON document.
        assert_eq!(loaded.attribute("n"), Some(&AttributeValue::I32(8)));
    }

    #[tokio::test]
    async fn record_ids_are_independent_of_session_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path()).await.unwrap();
        let ctx = RequestContext::new();
        let session = Session::new().unwrap();

        store.save(&ctx, &session).await.unwrap();
        let first = store.record(&ctx, &session.id).await.unwrap();
        store.update(&ctx, &first.session).await.unwrap();
        let updated = store.record(&ctx, &session.id).await.unwrap();
        assert_eq!(first.record_id, updated.record_id);

        store.save(&ctx, &session).await.unwrap();
        let replaced = store.record(&ctx, &session.id).await.unwrap();
        assert_ne!(first.record_id, replaced.record_id);
    }

    #[tokio::test]
    async fn ids_skip_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path()).await.unwrap();
        let ctx = RequestContext::new();

        let a = store.save(&ctx, &Session::new().unwrap()).await.unwrap();
        let b = store.save(&ctx, &Session::new().unwrap()).await.unwrap();
        std::fs::write(tmp.path().join("notes.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("README"), "x").unwrap();

        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(store.ids(&ctx).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn corrupt_document_is_a_serialization_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path()).await.unwrap();
        let ctx = RequestContext::new();
        let id = SessionId::generate().unwrap();
        std::fs::write(tmp.path().join(format!("{id}.json")), "not json").unwrap();

        let err = store.load(&ctx, &id).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { operation: "load", .. }));
    }

    #[tokio::test]
    async fn invalidate_missing_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path()).await.unwrap();
        let ctx = RequestContext::new();
        let id = SessionId::generate().unwrap();

        store.invalidate(&ctx, &id).await.unwrap();
        assert!(store.ids(&ctx).await.unwrap().is_empty());
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn writes_leave_no_temporary_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path()).await.unwrap();
        let ctx = RequestContext::new();
        let session = store.save(&ctx, &Session::new().unwrap()).await.unwrap();

        for i in 0..4i32 {
            let mut attrs = Attributes::new();
            attrs.insert(format!("k{i}"), i.into());
            store.add_attributes(&ctx, &session.id, attrs).await.unwrap();
        }
        store.load(&ctx, &session.id).await.unwrap();

        assert_eq!(file_names(tmp.path()), vec![format!("{}.json", session.id)]);
    }

    #[tokio::test]
    async fn cancelled_commit_keeps_previous_document() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path()).await.unwrap();
        let ctx = RequestContext::new();
        let mut session = Session::new().unwrap();
        session.set_attribute("n", 1i32);
        store.save(&ctx, &session).await.unwrap();
        let before = store.record(&ctx, &session.id).await.unwrap();

        // Cancellation that lands after the read but before the rename.
        let mut changed = before.clone();
        changed.session.set_attribute("n", 2i32);
        let aborted = RequestContext::new();
        aborted.cancel();
        let err = store
            .inner
            .commit(&aborted, "add_attributes", &changed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Cancelled { operation: "add_attributes" }));

        let after = store.record(&ctx, &session.id).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(file_names(tmp.path()), vec![format!("{}.json", session.id)]);
    }

    #[tokio::test]
    async fn non_finite_floats_are_stored() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path()).await.unwrap();
        let ctx = RequestContext::new();
        let mut session = Session::new().unwrap();
        session.set_attribute("score", f64::NAN);

        store.save(&ctx, &session).await.unwrap();
        let loaded = store.load(&ctx, &session.id).await.unwrap();
        assert!(loaded.get_float64("score").unwrap().is_nan());
        store.invalidate(&ctx, &session.id).await.unwrap();
        assert!(!store.load(&ctx, &session.id).await.unwrap().active);
    }
}
