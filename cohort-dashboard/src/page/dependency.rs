//! Bounded wait for the collaborators a page needs.

use crate::context::ContextResolver;
use cohort_cache::CoalescingLoader;
use cohort_core::{PageError, RetryPolicy};
use cohort_session::SessionStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// A collaborator that must be ready before a page runs.
pub trait Dependency: Send + Sync {
    fn name(&self) -> &str;
    fn is_ready(&self) -> bool;
}

impl Dependency for SessionStore {
    fn name(&self) -> &str {
        "session"
    }

    fn is_ready(&self) -> bool {
        SessionStore::is_ready(self)
    }
}

impl Dependency for ContextResolver {
    fn name(&self) -> &str {
        "context"
    }

    fn is_ready(&self) -> bool {
        self.is_loaded()
    }
}

impl Dependency for CoalescingLoader {
    fn name(&self) -> &str {
        "cache-loader"
    }

    fn is_ready(&self) -> bool {
        true
    }
}

/// Probe `dependencies` up to `policy.attempts` times, sleeping
/// `policy.interval` after each failed probe.
///
/// Returns the number of probes used. Exhaustion fails after exactly
/// `policy.ceiling()` with the names still missing at the last probe.
pub async fn wait_for_dependencies(
    dependencies: &[Arc<dyn Dependency>],
    policy: RetryPolicy,
) -> Result<u32, PageError> {
    let mut missing = Vec::new();
    for attempt in 1..=policy.attempts {
        missing = dependencies
            .iter()
            .filter(|dependency| !dependency.is_ready())
            .map(|dependency| dependency.name().to_string())
            .collect();
        if missing.is_empty() {
            debug!(attempt, "page dependencies ready");
            return Ok(attempt);
        }
        debug!(attempt, ?missing, "page dependencies not ready");
        tokio::time::sleep(policy.interval()).await;
    }

    warn!(attempts = policy.attempts, ?missing, "page dependencies unavailable");
    Err(PageError::DependenciesUnavailable {
        attempts: policy.attempts,
        missing,
    })
}
