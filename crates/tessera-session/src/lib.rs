//! Server-side session management for Tessera.
//!
//! A [`Session`] is identified by an opaque 52-character [`SessionId`],
//! carries a typed attribute bag, a cookie policy and idle/absolute timeouts.
//! Durability goes through a [`SessionStore`]; the [`SessionService`] is the
//! entry point for application code.
//!
//! ```no_run
//! use tessera_core::RequestContext;
//! use tessera_session::{
//!     CookiePolicy, DefaultSessionService, InMemorySessionStore, KeyValues, SessionService,
//!     TimeoutPolicy,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let service = DefaultSessionService::new(InMemorySessionStore::new());
//! let ctx = RequestContext::new().with_request_id("rq-42");
//! let session = service
//!     .create_user_session(
//!         &ctx,
//!         "user-1",
//!         CookiePolicy::default(),
//!         TimeoutPolicy::default(),
//!         KeyValues::new().pair("role", "admin"),
//!     )
//!     .await?;
//! assert_eq!(session.get_string("role"), Some("admin"));
//! # Ok(())
//! # }
//! ```

mod accessors;
pub mod attributes;
pub mod config;
pub mod id;
pub mod service;
pub mod session;
pub mod store;
pub mod value;

pub use attributes::{parse_attributes, Attributes, KeyValues};
pub use config::{ConfigError, SessionConfig};
pub use id::SessionId;
pub use service::{DefaultSessionService, SessionService};
pub use session::{CookiePolicy, SameSite, Session, TimeoutPolicy};
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore, StoredSession};
#[cfg(feature = "sqlite")]
pub use store::SqliteSessionStore;
pub use value::AttributeValue;
