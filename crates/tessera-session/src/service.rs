//! The session service: parses caller input, drives the store and translates
//! its errors.
//!
//! Every store call runs under [`RequestContext::run`], so a cancelled request
//! or an elapsed deadline aborts the backend call in flight. Nothing is
//! retried. Outcomes are traced at `debug` only; whether a failure matters is
//! the caller's decision.

use crate::attributes::{parse_attributes, KeyValues};
use crate::id::SessionId;
use crate::session::{CookiePolicy, Session, TimeoutPolicy};
use crate::store::SessionStore;
use async_trait::async_trait;
use tessera_core::{RequestContext, SessionError, SessionResult};
use tracing::debug;

/// Session operations exposed to the application layer.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Creates and persists an anonymous session carrying `attrs`.
    async fn create_anonymous_session(
        &self,
        ctx: &RequestContext,
        cookie: CookiePolicy,
        timeouts: TimeoutPolicy,
        attrs: KeyValues,
    ) -> SessionResult<Session>;

    /// Creates and persists a session bound to `user_id`.
    async fn create_user_session(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        cookie: CookiePolicy,
        timeouts: TimeoutPolicy,
        attrs: KeyValues,
    ) -> SessionResult<Session>;

    /// Loads a session. A missing session is [`SessionError::NotFound`].
    async fn load_session(&self, ctx: &RequestContext, id: &SessionId) -> SessionResult<Session>;

    /// Invalidates a session. Invalidating a missing session succeeds.
    async fn invalidate_session(&self, ctx: &RequestContext, id: &SessionId) -> SessionResult<()>;

    /// Merges `attrs` into a stored session.
    async fn add_attributes(
        &self,
        ctx: &RequestContext,
        id: &SessionId,
        attrs: KeyValues,
    ) -> SessionResult<Session>;

    /// Removes the named keys from a stored session.
    async fn remove_attributes(
        &self,
        ctx: &RequestContext,
        id: &SessionId,
        keys: &[String],
    ) -> SessionResult<Session>;
}

/// [`SessionService`] over any [`SessionStore`].
pub struct DefaultSessionService<S> {
    store: S,
}

impl<S: SessionStore> DefaultSessionService<S> {
    /// Wraps `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        user_id: Option<&str>,
        cookie: CookiePolicy,
        timeouts: TimeoutPolicy,
        attrs: KeyValues,
    ) -> SessionResult<Session> {
        let data =
            parse_attributes(&attrs).map_err(|source| SessionError::Parse { operation, source })?;
        let mut session =
            Session::new().map_err(|source| SessionError::Generation { operation, source })?;

        session.apply_cookie_policy(cookie);
        session.apply_timeout_policy(timeouts);
        if let Some(uid) = user_id {
            session.attach_user(uid);
        }
        session.set_attributes(data);

        ctx.run("save", self.store.save(ctx, &session))
            .await
            .map_err(|e| SessionError::from_store(operation, e))
    }
}

#[async_trait]
impl<S: SessionStore> SessionService for DefaultSessionService<S> {
    async fn create_anonymous_session(
        &self,
        ctx: &RequestContext,
        cookie: CookiePolicy,
        timeouts: TimeoutPolicy,
        attrs: KeyValues,
    ) -> SessionResult<Session> {
        const OP: &str = "create_anonymous_session";
        started(ctx, OP, None);
        let result = self.create(ctx, OP, None, cookie, timeouts, attrs).await;
        let sid = result.as_ref().ok().map(|s| s.id.clone());
        finished(ctx, OP, sid.as_ref(), result)
    }

    async fn create_user_session(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        cookie: CookiePolicy,
        timeouts: TimeoutPolicy,
        attrs: KeyValues,
    ) -> SessionResult<Session> {
        const OP: &str = "create_user_session";
        started(ctx, OP, None);
        let result = self
            .create(ctx, OP, Some(user_id), cookie, timeouts, attrs)
            .await;
        let sid = result.as_ref().ok().map(|s| s.id.clone());
        finished(ctx, OP, sid.as_ref(), result)
    }

    async fn load_session(&self, ctx: &RequestContext, id: &SessionId) -> SessionResult<Session> {
        const OP: &str = "load_session";
        started(ctx, OP, Some(id));
        let result = ctx
            .run("load", self.store.load(ctx, id))
            .await
            .map_err(|e| SessionError::from_store(OP, e));
        finished(ctx, OP, Some(id), result)
    }

    async fn invalidate_session(&self, ctx: &RequestContext, id: &SessionId) -> SessionResult<()> {
        const OP: &str = "invalidate_session";
        started(ctx, OP, Some(id));
        let result = ctx
            .run("invalidate", self.store.invalidate(ctx, id))
            .await
            .map_err(|e| SessionError::from_store(OP, e));
        finished(ctx, OP, Some(id), result)
    }

    async fn add_attributes(
        &self,
        ctx: &RequestContext,
        id: &SessionId,
        attrs: KeyValues,
    ) -> SessionResult<Session> {
        const OP: &str = "add_attributes";
        started(ctx, OP, Some(id));
        let result = async {
            if attrs.is_empty() {
                return Err(SessionError::EmptyAttributes {
                    operation: OP,
                    action: "add",
                });
            }
            let data = parse_attributes(&attrs)
                .map_err(|source| SessionError::Parse { operation: OP, source })?;
            ctx.run("add_attributes", self.store.add_attributes(ctx, id, data))
                .await
                .map_err(|e| SessionError::from_store(OP, e))
        }
        .await;
        finished(ctx, OP, Some(id), result)
    }

    async fn remove_attributes(
        &self,
        ctx: &RequestContext,
        id: &SessionId,
        keys: &[String],
    ) -> SessionResult<Session> {
        const OP: &str = "remove_attributes";
        started(ctx, OP, Some(id));
        let result = if keys.is_empty() {
            Err(SessionError::EmptyAttributes {
                operation: OP,
                action: "remove",
            })
        } else {
            ctx.run("remove_attributes", self.store.remove_attributes(ctx, id, keys))
                .await
                .map_err(|e| SessionError::from_store(OP, e))
        };
        finished(ctx, OP, Some(id), result)
    }
}

fn started(ctx: &RequestContext, operation: &'static str, sid: Option<&SessionId>) {
    debug!(
        operation,
        sid = sid.map(SessionId::as_str),
        request_id = ctx.request_id(),
        "started"
    );
}

fn finished<T>(
    ctx: &RequestContext,
    operation: &'static str,
    sid: Option<&SessionId>,
    result: SessionResult<T>,
) -> SessionResult<T> {
    let sid = sid.map(SessionId::as_str);
    match &result {
        Ok(_) => debug!(operation, sid, request_id = ctx.request_id(), "finished"),
        Err(e) => debug!(
            operation,
            sid,
            request_id = ctx.request_id(),
            error = %e,
            "failed"
        ),
    }
    result
}
