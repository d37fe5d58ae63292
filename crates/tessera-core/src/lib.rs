//! Shared building blocks for the Tessera session crates.
//!
//! # Main types
//!
//! - [`SessionError`] - Error returned by the session service.
//! - [`StoreError`] - Error returned by storage backends.
//! - [`FormatError`], [`ParseError`], [`GenerationError`] - Caller-input and
//!   entropy failures detected before any backend call.
//! - [`RequestContext`] - Request id, deadline and cancellation carried
//!   through every call.
//! - [`logging::init`] - Installs the process-wide tracing subscriber.

/// Request-scoped cancellation and deadlines.
pub mod context;
/// Error taxonomy.
pub mod error;
/// Tracing subscriber setup.
pub mod logging;

pub use context::RequestContext;
pub use error::{
    BoxError, FormatError, GenerationError, ParseError, SessionError, SessionResult, StoreError,
    StoreResult,
};
pub use logging::LogFormat;
