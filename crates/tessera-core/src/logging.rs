use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Output format for the process-wide tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive`. Fails if a global
/// subscriber is already set.
pub fn init(
    format: LogFormat,
    default_directive: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }
        let w: Wrapper = from_json(r#"{"format":"json"}"#);
        assert_eq!(w.format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> T {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn second_init_reports_error() {
        let first = init(LogFormat::Pretty, "debug");
        let second = init(LogFormat::Json, "debug");
        // Another test in this binary may have installed a subscriber first.
        assert!(first.is_err() || second.is_err());
    }
}
