use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::{logging, LogFormat, RequestContext};
use tessera_session::{
    id, DefaultSessionService, FileSessionStore, KeyValues, SessionConfig, SessionId,
    SessionService,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "tessera", about = "Tessera server-side session administration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tessera.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a freshly generated session id
    GenId,
    /// Check that a session id is well formed
    Validate { sid: String },
    /// Create and store a new session
    Create {
        /// Bind the session to this user id
        #[arg(long)]
        user: Option<String>,
        /// Attribute as key=value (stored as a string)
        #[arg(long = "attr", value_parser = parse_pair)]
        attrs: Vec<(String, String)>,
    },
    /// Print a stored session as JSON
    Show { sid: String },
    /// Set attributes on a stored session
    Set {
        sid: String,
        /// Attributes as key=value (stored as strings)
        #[arg(value_parser = parse_pair, required = true)]
        attrs: Vec<(String, String)>,
    },
    /// Remove attributes from a stored session
    Unset {
        sid: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Invalidate a stored session
    Invalidate { sid: String },
    /// List stored session ids
    List,
}

#[derive(Deserialize, Default)]
struct TesseraConfig {
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default)]
    log: LogConfig,
    #[serde(flatten)]
    session: SessionConfig,
}

#[derive(Deserialize)]
struct LogConfig {
    #[serde(default)]
    format: LogFormat,
    #[serde(default = "default_level")]
    level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_level(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/sessions")
}
fn default_level() -> String {
    "info".to_string()
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

fn key_values(attrs: Vec<(String, String)>) -> KeyValues {
    attrs.into_iter().collect()
}

fn parse_sid(sid: &str) -> anyhow::Result<SessionId> {
    SessionId::parse(sid).with_context(|| format!("invalid session id '{sid}'"))
}

fn load_config(path: &Path) -> anyhow::Result<TesseraConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file '{}'", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TesseraConfig {
            data_dir: default_data_dir(),
            ..TesseraConfig::default()
        }),
        Err(e) => Err(e)
            .with_context(|| format!("Failed to read config file '{}'", path.display())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init(config.log.format, &config.log.level)
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {e}"))?;
    debug!(config = %cli.config.display(), data_dir = %config.data_dir.display(), "configuration loaded");

    // Commands that never touch the store.
    match &cli.command {
        Commands::GenId => {
            println!("{}", id::generate()?);
            return Ok(());
        }
        Commands::Validate { sid } => {
            id::validate(sid).with_context(|| format!("'{sid}' is not a valid session id"))?;
            println!("ok");
            return Ok(());
        }
        _ => {}
    }

    let store = Arc::new(
        FileSessionStore::new(&config.data_dir)
            .await
            .with_context(|| format!("Failed to open store at '{}'", config.data_dir.display()))?,
    );
    let service = DefaultSessionService::new(Arc::clone(&store));
    let ctx = RequestContext::new();

    match cli.command {
        Commands::GenId | Commands::Validate { .. } => {}
        Commands::Create { user, attrs } => {
            let cookie = config.session.cookie_policy();
            let timeouts = config.session.timeout_policy();
            let attrs = key_values(attrs);
            let session = match user {
                Some(uid) => {
                    service
                        .create_user_session(&ctx, &uid, cookie, timeouts, attrs)
                        .await?
                }
                None => {
                    service
                        .create_anonymous_session(&ctx, cookie, timeouts, attrs)
                        .await?
                }
            };
            info!(sid = %session.id, "session created");
            println!("{}", session.id);
        }
        Commands::Show { sid } => {
            let sid = parse_sid(&sid)?;
            let session = service.load_session(&ctx, &sid).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
            if session.is_expired() {
                println!("(expired)");
            }
        }
        Commands::Set { sid, attrs } => {
            let sid = parse_sid(&sid)?;
            let session = service.add_attributes(&ctx, &sid, key_values(attrs)).await?;
            println!("{} attribute(s) on {}", session.data.len(), session.id);
        }
        Commands::Unset { sid, keys } => {
            let sid = parse_sid(&sid)?;
            let session = service.remove_attributes(&ctx, &sid, &keys).await?;
            println!("{} attribute(s) on {}", session.data.len(), session.id);
        }
        Commands::Invalidate { sid } => {
            let sid = parse_sid(&sid)?;
            service.invalidate_session(&ctx, &sid).await?;
            info!(sid = %sid, "session invalidated");
        }
        Commands::List => {
            let ids = store.ids(&ctx).await?;
            if ids.is_empty() {
                println!("No sessions stored in {}", store.dir().display());
            }
            for sid in &ids {
                println!("{sid}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::time::Duration;
    use tessera_session::SameSite;

    #[test]
    fn pairs_split_on_first_equals() {
        assert_eq!(
            parse_pair("token=a=b").unwrap(),
            ("token".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_pair("empty=").unwrap(), ("empty".to_string(), String::new()));
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn command_line_values_stay_strings() {
        let kv = key_values(vec![("n".into(), "42".into())]);
        let data = tessera_session::parse_attributes(&kv).unwrap();
        assert_eq!(data["n"], tessera_session::AttributeValue::from("42"));
    }

    #[test]
    fn config_sections_are_read() {
        let config: TesseraConfig = toml::from_str(
            r#"
            data_dir = "/var/lib/tessera"

            [log]
            format = "json"
            level = "debug"

            [cookie]
            same_site = "lax"

            [timeouts]
            idle_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/tessera"));
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.session.cookie_policy().same_site, SameSite::Lax);
        assert_eq!(
            config.session.timeout_policy().idle_timeout,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/tessera.toml")).unwrap();
        assert_eq!(config.data_dir, default_data_dir());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn cli_parses_repeated_attrs() {
        let cli = Cli::try_parse_from([
            "tessera", "create", "--user", "u-1", "--attr", "a=1", "--attr", "b=2",
        ])
        .unwrap();
        match cli.command {
            Commands::Create { user, attrs } => {
                assert_eq!(user.as_deref(), Some("u-1"));
                assert_eq!(attrs.len(), 2);
            }
            _ => panic!("expected create"),
        }

        assert!(Cli::try_parse_from(["tessera", "unset", "SID"]).is_err());
    }
}
