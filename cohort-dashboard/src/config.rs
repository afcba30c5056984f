//! Configuration loading for the Cohort dashboard client.
//!
//! Connection fields are required. Orchestration tunables fall back to the
//! documented defaults when their section is omitted.

use crate::telemetry::LogFormat;
use cohort_core::{OrchestrationConfig, RetryPolicy, DEFAULT_CACHE_TTL_MS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "COHORT_DASHBOARD_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub ws_endpoint: String,
    pub request_timeout_ms: u64,
    pub credentials_path: PathBuf,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default = "RetryPolicy::context_default")]
    pub context_wait: RetryPolicy,
    #[serde(default = "RetryPolicy::dependency_default")]
    pub dependency_wait: RetryPolicy,
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutesConfig {
    pub login_path: String,
    pub unauthorized_path: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        let defaults = OrchestrationConfig::default();
        Self {
            login_path: defaults.login_path,
            unauthorized_path: defaults.unauthorized_path,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    pub ttl_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_CACHE_TTL_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or COHORT_DASHBOARD_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error(transparent)]
    Orchestration(#[from] cohort_core::ConfigError),
}

impl DashboardConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.ws_endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ws_endpoint",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.credentials_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "credentials_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.reconnect.initial_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.initial_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.reconnect.max_ms < self.reconnect.initial_ms {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.max_ms",
                reason: "must be >= initial_ms".to_string(),
            });
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.multiplier",
                reason: "must be >= 1.0".to_string(),
            });
        }
        self.orchestration().validate()?;
        Ok(())
    }

    /// Tunables for the cache, resolver, guard and pages.
    pub fn orchestration(&self) -> OrchestrationConfig {
        OrchestrationConfig::new()
            .with_cache_ttl(Duration::from_millis(self.cache.ttl_ms))
            .with_context_wait(self.context_wait)
            .with_dependency_wait(self.dependency_wait)
            .with_login_path(self.routes.login_path.clone())
            .with_unauthorized_path(self.routes.unauthorized_path.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
