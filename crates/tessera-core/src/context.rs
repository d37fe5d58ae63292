//! Request-scoped execution context.
//!
//! Every service and store call takes a [`RequestContext`]. It carries the
//! caller's request id for log correlation, an optional deadline, and a
//! cancellation token. [`RequestContext::run`] races a store future against
//! both, so an abandoned request aborts the in-flight backend call instead of
//! letting it finish unobserved.

use crate::error::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation, deadline and correlation data for one logical request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    request_id: Option<String>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Creates a context with no deadline and no request id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a request id that is recorded on every log line.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Sets a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets an absolute deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Uses the given token instead of a private one, so an outer scope can
    /// cancel this request.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Derives a context whose token is cancelled with this one but can also
    /// be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            request_id: self.request_id.clone(),
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }

    /// The request id, if one was attached.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A clone of the cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels this request and every child derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `true` once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails fast if the request is already cancelled or past its deadline.
    pub fn check(&self, operation: &'static str) -> StoreResult<()> {
        if self.is_cancelled() {
            return Err(StoreError::Cancelled { operation });
        }
        if self.is_expired() {
            return Err(StoreError::DeadlineExceeded { operation });
        }
        Ok(())
    }

    /// Drives `fut` to completion unless the request is cancelled or its
    /// deadline passes first, in which case `fut` is dropped.
    pub async fn run<F, T>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.check(operation)?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Cancelled { operation }),
            _ = wait_for(self.deadline) => Err(StoreError::DeadlineExceeded { operation }),
            res = fut => res,
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
