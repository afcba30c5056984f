//! Tracing subscriber setup for the dashboard binary.

use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::DashboardError;

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "COHORT_LOG";

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    Json,
}

/// `COHORT_LOG`, then `RUST_LOG`, then `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(format: LogFormat) -> Result<(), DashboardError> {
    let pretty = (format == LogFormat::Pretty).then(tracing_subscriber::fmt::layer);
    let json = (format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json());

    tracing_subscriber::registry()
        .with(env_filter())
        .with(pretty)
        .with(json)
        .try_init()
        .map_err(|e| DashboardError::Telemetry(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(?format, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }
        let parsed: Wrapper = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(parsed.format, LogFormat::Json);
        assert!(toml::from_str::<Wrapper>("format = \"xml\"").is_err());
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        let _ = init_tracing(LogFormat::Pretty);
        assert!(matches!(
            init_tracing(LogFormat::Json),
            Err(DashboardError::Telemetry(_))
        ));
    }
}
