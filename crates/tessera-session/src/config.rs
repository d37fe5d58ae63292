//! TOML configuration for cookie and timeout policies.
//!
//! ```toml
//! [cookie]
//! path = "/"
//! domain = "example.com"
//! secure = true
//! http_only = true
//! max_age_secs = 86400
//! same_site = "lax"
//!
//! [timeouts]
//! idle_secs = 3600
//! absolute_secs = 604800
//! ```
//!
//! Every field is optional and defaults to the built-in policy.

use crate::session::{
    CookiePolicy, SameSite, TimeoutPolicy, DEFAULT_ABSOLUTE_TIMEOUT, DEFAULT_COOKIE_MAX_AGE,
    DEFAULT_IDLE_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading a [`SessionConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("invalid session config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Session policy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `[cookie]` table.
    pub cookie: CookieConfig,
    /// `[timeouts]` table.
    pub timeouts: TimeoutConfig,
}

/// `[cookie]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieConfig {
    /// Cookie `Path`, default `/`.
    #[serde(default = "default_path")]
    pub path: String,
    /// Cookie `Domain`, default host-only.
    #[serde(default)]
    pub domain: String,
    /// Default `true`.
    #[serde(default = "default_true")]
    pub secure: bool,
    /// Default `true`.
    #[serde(default = "default_true")]
    pub http_only: bool,
    /// Max-Age, default one day.
    #[serde(default = "default_max_age")]
    pub max_age_secs: i64,
    /// Default `strict`.
    #[serde(default)]
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            domain: String::new(),
            secure: true,
            http_only: true,
            max_age_secs: default_max_age(),
            same_site: SameSite::default(),
        }
    }
}

/// `[timeouts]` section, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Idle timeout, default one day.
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
    /// Absolute timeout, default seven days.
    #[serde(default = "default_absolute_secs")]
    pub absolute_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            idle_secs: default_idle_secs(),
            absolute_secs: default_absolute_secs(),
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_age() -> i64 {
    DEFAULT_COOKIE_MAX_AGE
}
fn default_idle_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT.as_secs()
}
fn default_absolute_secs() -> u64 {
    DEFAULT_ABSOLUTE_TIMEOUT.as_secs()
}

impl SessionConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads and parses the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// The configured cookie policy.
    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy::from(&self.cookie)
    }

    /// The configured timeout policy.
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::from(self.timeouts)
    }
}

impl From<&CookieConfig> for CookiePolicy {
    fn from(c: &CookieConfig) -> Self {
        CookiePolicy {
            path: c.path.clone(),
            domain: c.domain.clone(),
            secure: c.secure,
            http_only: c.http_only,
            max_age: c.max_age_secs,
            same_site: c.same_site,
        }
    }
}

impl From<TimeoutConfig> for TimeoutPolicy {
    fn from(t: TimeoutConfig) -> Self {
        TimeoutPolicy {
            idle_timeout: Duration::from_secs(t.idle_secs),
            absolute_timeout: Duration::from_secs(t.absolute_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_builtin_policies() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config.cookie_policy(), CookiePolicy::default());
        assert_eq!(config.timeout_policy(), TimeoutPolicy::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = SessionConfig::from_toml_str(
            r#"
            [cookie]
            domain = "example.com"
            same_site = "lax"

            [timeouts]
            idle_secs = 60
            "#,
        )
        .unwrap();

        let cookie = config.cookie_policy();
        assert_eq!(cookie.domain, "example.com");
        assert_eq!(cookie.same_site, SameSite::Lax);
        assert_eq!(cookie.path, "/");
        assert!(cookie.secure);
        assert_eq!(cookie.max_age, 86_400);

        let timeouts = config.timeout_policy();
        assert_eq!(timeouts.idle_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.absolute_timeout, DEFAULT_ABSOLUTE_TIMEOUT);
    }

    #[test]
    fn unknown_same_site_is_rejected() {
        let err = SessionConfig::from_toml_str("[cookie]\nsame_site = \"sometimes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("absent.toml");
        let err = SessionConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn load_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.toml");
        std::fs::write(&path, "[timeouts]\nabsolute_secs = 120\n").unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.timeouts.absolute_secs, 120);
        assert_eq!(config.timeouts.idle_secs, 86_400);
    }
}
