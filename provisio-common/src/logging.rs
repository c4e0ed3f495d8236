//! Logging initialization using tracing.
//!
//! Events always go to stderr; stdout is reserved for command output.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines with source locations
    #[default]
    Pretty,
    /// One JSON object per event, for log collectors
    Json,
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level` when it is set. Fails if a
/// subscriber is already installed.
///
/// # Example
/// ```
/// use provisio_common::{init_logging, LogFormat};
///
/// init_logging("info", LogFormat::Pretty).unwrap();
/// ```
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    match format {
        LogFormat::Pretty => builder.with_file(true).with_line_number(true).try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        let first = init_logging("debug", LogFormat::Json);
        let second = init_logging("info", LogFormat::Pretty);
        assert!(first.is_ok() || second.is_ok());
        assert!(first.is_err() || second.is_err());
    }

    #[test]
    fn test_format_names() {
        let format: LogFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
