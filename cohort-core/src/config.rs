//! Orchestration tunables shared by the cache, resolver, guard and pages.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Default cache entry lifetime (5 minutes).
pub const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1000;

/// Longest total wait a [`RetryPolicy`] may configure (1 hour).
pub const MAX_WAIT_CEILING: Duration = Duration::from_secs(60 * 60);

/// Bounded wait: `attempts` probes spaced `interval_ms` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, interval_ms: u64) -> Self {
        Self {
            attempts,
            interval_ms,
        }
    }

    /// Session wait used by the context resolver: 50 x 100ms.
    pub const fn context_default() -> Self {
        Self::new(50, 100)
    }

    /// Collaborator wait used by page controllers: 10 x 500ms.
    pub const fn dependency_default() -> Self {
        Self::new(10, 500)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Total time budget the policy allows. Saturates at [`Duration::MAX`].
    pub fn ceiling(&self) -> Duration {
        self.interval()
            .checked_mul(self.attempts)
            .unwrap_or(Duration::MAX)
    }

    pub fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.attempts", field),
                reason: "must be > 0".to_string(),
            });
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.interval_ms", field),
                reason: "must be > 0".to_string(),
            });
        }
        if self.ceiling() > MAX_WAIT_CEILING {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                reason: format!(
                    "attempts x interval_ms must not exceed {}ms",
                    MAX_WAIT_CEILING.as_millis()
                ),
            });
        }
        Ok(())
    }
}

/// Everything the orchestration layer needs to know that is not code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestrationConfig {
    pub cache_ttl_ms: u64,
    pub context_wait: RetryPolicy,
    pub dependency_wait: RetryPolicy,
    pub login_path: String,
    pub unauthorized_path: String,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            context_wait: RetryPolicy::context_default(),
            dependency_wait: RetryPolicy::dependency_default(),
            login_path: "/login".to_string(),
            unauthorized_path: "/unauthorized".to_string(),
        }
    }
}

impl OrchestrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_context_wait(mut self, policy: RetryPolicy) -> Self {
        self.context_wait = policy;
        self
    }

    pub fn with_dependency_wait(mut self, policy: RetryPolicy) -> Self {
        self.dependency_wait = policy;
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn with_unauthorized_path(mut self, path: impl Into<String>) -> Self {
        self.unauthorized_path = path.into();
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_ttl_ms".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        self.context_wait.validate("context_wait")?;
        self.dependency_wait.validate("dependency_wait")?;
        for (field, path) in [
            ("login_path", &self.login_path),
            ("unauthorized_path", &self.unauthorized_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("'{}' must start with '/'", path),
                });
            }
        }
        Ok(())
    }
}
