//! The session entity and the cookie and timeout policies it carries.
//!
//! Expiry is computed here from the timestamps the store assigns; the entity
//! itself never talks to a store.

use crate::attributes::Attributes;
use crate::id::SessionId;
use crate::value::AttributeValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tessera_core::GenerationError;

/// Default idle timeout: one day.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Default absolute timeout: seven days.
pub const DEFAULT_ABSOLUTE_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default cookie max-age in seconds: one day.
pub const DEFAULT_COOKIE_MAX_AGE: i64 = 24 * 60 * 60;

/// Cookie `SameSite` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// Leave the attribute to the browser default.
    Default,
    /// `SameSite=Lax`.
    Lax,
    /// `SameSite=Strict`.
    #[default]
    Strict,
    /// `SameSite=None`.
    None,
}

/// Cookie transport metadata carried with a session.
///
/// The session core never interprets these fields; the HTTP layer uses them
/// when it writes the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookiePolicy {
    /// Cookie `Path`.
    pub path: String,
    /// Cookie `Domain`; empty means host-only.
    pub domain: String,
    /// Send only over HTTPS.
    pub secure: bool,
    /// Hide the cookie from scripts.
    pub http_only: bool,
    /// Max-Age in seconds.
    pub max_age: i64,
    /// Cross-site sending policy.
    pub same_site: SameSite,
}

impl Default for CookiePolicy {
    /// Secure, HTTP-only, path `/`, one day max-age, `SameSite=Strict`.
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: String::new(),
            secure: true,
            http_only: true,
            max_age: DEFAULT_COOKIE_MAX_AGE,
            same_site: SameSite::Strict,
        }
    }
}

/// Idle and absolute lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    /// Maximum inactivity before the session expires.
    pub idle_timeout: Duration,
    /// Maximum total lifetime regardless of activity.
    pub absolute_timeout: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            absolute_timeout: DEFAULT_ABSOLUTE_TIMEOUT,
        }
    }
}

/// A server-side session.
///
/// `last_accessed_at` and `created_at` are owned by the store: it assigns
/// them on every write and the copies held in memory are only as fresh as the
/// last store call. An entity that was never saved carries the Unix epoch in
/// both and is therefore expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Random identifier sent to the client.
    pub id: SessionId,
    /// Attribute bag.
    #[serde(default)]
    pub data: Attributes,
    /// Cookie metadata for the HTTP layer.
    pub cookie: CookiePolicy,
    /// `true` until a user is attached.
    pub anonymous: bool,
    /// Cleared by invalidation.
    pub active: bool,
    /// Empty while the session is anonymous.
    #[serde(default)]
    pub user_id: String,
    /// Maximum inactivity.
    pub idle_timeout: Duration,
    /// Maximum lifetime.
    pub absolute_timeout: Duration,
    /// Last store write or load.
    pub last_accessed_at: DateTime<Utc>,
    /// Set by `save`.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Creates an anonymous, active session with a fresh id and the default
    /// cookie and timeout policies.
    pub fn new() -> Result<Self, GenerationError> {
        let id = SessionId::generate()?;
        Ok(Self::with_id(id))
    }

    /// Same as [`Session::new`] but with a caller-provided id.
    pub fn with_id(id: SessionId) -> Self {
        let timeouts = TimeoutPolicy::default();
        Self {
            id,
            data: Attributes::new(),
            cookie: CookiePolicy::default(),
            anonymous: true,
            active: true,
            user_id: String::new(),
            idle_timeout: timeouts.idle_timeout,
            absolute_timeout: timeouts.absolute_timeout,
            last_accessed_at: DateTime::<Utc>::default(),
            created_at: DateTime::<Utc>::default(),
        }
    }

    /// Binds the session to a user. The id is not validated.
    pub fn attach_user(&mut self, user_id: impl Into<String>) {
        self.user_id = user_id.into();
        self.anonymous = false;
    }

    /// Replaces the cookie policy.
    pub fn apply_cookie_policy(&mut self, policy: CookiePolicy) {
        self.cookie = policy;
    }

    /// Replaces both timeouts.
    pub fn apply_timeout_policy(&mut self, policy: TimeoutPolicy) {
        self.idle_timeout = policy.idle_timeout;
        self.absolute_timeout = policy.absolute_timeout;
    }

    /// The current timeouts as a policy value.
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            idle_timeout: self.idle_timeout,
            absolute_timeout: self.absolute_timeout,
        }
    }

    /// Stores one attribute, replacing any previous value under `key`.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.data.insert(key.into(), value.into());
    }

    /// Stores every entry of `attrs`; later writes win on key collision.
    pub fn set_attributes(&mut self, attrs: Attributes) {
        self.data.extend(attrs);
    }

    /// Raw attribute lookup.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.data.get(key)
    }

    /// Removes an attribute, returning its value if it was present.
    pub fn remove_attribute(&mut self, key: &str) -> Option<AttributeValue> {
        self.data.remove(key)
    }

    /// Whether the session is invalidated or past either timeout.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// [`Session::is_expired`] evaluated against an explicit instant.
    ///
    /// A timeout of zero expires immediately: a deadline equal to `now` counts
    /// as passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return true;
        }
        passed(self.last_accessed_at, self.idle_timeout, now)
            || passed(self.created_at, self.absolute_timeout, now)
    }
}

/// `start + timeout <= now`. A timeout too large to represent never passes.
fn passed(start: DateTime<Utc>, timeout: Duration, now: DateTime<Utc>) -> bool {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|d| start.checked_add_signed(d))
        .is_some_and(|deadline| deadline <= now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persisted(idle: Duration, abs: Duration) -> Session {
        let mut s = Session::new().unwrap();
        let now = Utc::now();
        s.last_accessed_at = now;
        s.created_at = now;
        s.apply_timeout_policy(TimeoutPolicy {
            idle_timeout: idle,
            absolute_timeout: abs,
        });
        s
    }

    #[test]
    fn new_session_defaults() {
        let s = Session::new().unwrap();
        assert!(s.anonymous);
        assert!(s.active);
        assert!(s.user_id.is_empty());
        assert!(s.data.is_empty());
        assert_eq!(s.cookie, CookiePolicy::default());
        assert_eq!(s.cookie.path, "/");
        assert_eq!(s.cookie.max_age, 86_400);
        assert_eq!(s.cookie.same_site, SameSite::Strict);
        assert!(s.cookie.secure && s.cookie.http_only);
        assert_eq!(s.idle_timeout, Duration::from_secs(86_400));
        assert_eq!(s.absolute_timeout, Duration::from_secs(7 * 86_400));
        crate::id::validate(s.id.as_str()).unwrap();
    }

    #[test]
    fn unsaved_session_is_expired() {
        let s = Session::new().unwrap();
        assert!(s.is_expired());
    }

    #[test]
    fn attach_user_is_idempotent() {
        let mut s = Session::new().unwrap();
        s.attach_user("u-1");
        s.attach_user("u-1");
        assert!(!s.anonymous);
        assert_eq!(s.user_id, "u-1");
    }

    #[test]
    fn set_attributes_last_write_wins() {
        let mut s = Session::new().unwrap();
        s.set_attribute("k", "old");
        let mut attrs = Attributes::new();
        attrs.insert("k".into(), "new".into());
        attrs.insert("other".into(), 1i32.into());
        s.set_attributes(attrs);

        assert_eq!(s.attribute("k"), Some(&AttributeValue::from("new")));
        assert_eq!(s.data.len(), 2);
        assert_eq!(s.remove_attribute("other"), Some(AttributeValue::I32(1)));
        assert!(s.attribute("other").is_none());
    }

    #[test]
    fn expiry_matrix() {
        let hour = Duration::from_secs(3600);
        let zero = Duration::ZERO;

        let cases = [
            ("fresh", persisted(hour, hour), false),
            ("idle elapsed", persisted(zero, hour), true),
            ("absolute elapsed", persisted(hour, zero), true),
            ("both elapsed", persisted(zero, zero), true),
        ];
        for (name, s, expected) in cases {
            assert_eq!(s.is_expired(), expected, "{name}");

            let mut user = s.clone();
            user.attach_user("1111");
            assert_eq!(user.is_expired(), expected, "{name} (user)");
        }
    }

    #[test]
    fn inactive_is_always_expired() {
        let mut s = persisted(Duration::from_secs(3600), Duration::from_secs(3600));
        assert!(!s.is_expired());
        s.active = false;
        assert!(s.is_expired());
    }

    #[test]
    fn expiry_uses_both_clocks() {
        let mut s = persisted(Duration::from_secs(60), Duration::from_secs(600));
        let now = s.created_at;

        assert!(!s.is_expired_at(now + chrono::Duration::seconds(59)));
        assert!(s.is_expired_at(now + chrono::Duration::seconds(60)));

        // Activity keeps the idle clock fresh but not the absolute one.
        s.last_accessed_at = now + chrono::Duration::seconds(590);
        assert!(!s.is_expired_at(now + chrono::Duration::seconds(599)));
        assert!(s.is_expired_at(now + chrono::Duration::seconds(600)));
    }

    #[test]
    fn huge_timeout_never_expires() {
        let s = persisted(Duration::MAX, Duration::MAX);
        assert!(!s.is_expired());
    }
}
