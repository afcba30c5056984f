//! Role and community context derived from the session.

use crate::service::DashboardData;
use crate::types::CommunityContext;
use cohort_core::{
    can_access_page, CommunityId, DataLoadingStrategy, LoadError, RetryPolicy, Role, UserIdentity,
};
use cohort_session::SessionStore;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info};

/// Resolver lifecycle. Only `Loaded` counts as ready for pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Uninitialized,
    Loaded,
    /// The session never became ready within the wait policy.
    TimedOut,
}

#[derive(Debug)]
struct ResolverInner {
    state: ResolverState,
    context: CommunityContext,
}

/// Translates the current session into role-scoped behavior.
///
/// All reads come off the session snapshot, so a logout or refresh is
/// reflected immediately without re-initialising.
pub struct ContextResolver {
    session: Arc<SessionStore>,
    data: DashboardData,
    wait: RetryPolicy,
    inner: Mutex<ResolverInner>,
}

impl ContextResolver {
    pub fn new(session: Arc<SessionStore>, data: DashboardData, wait: RetryPolicy) -> Self {
        Self {
            session,
            data,
            wait,
            inner: Mutex::new(ResolverInner {
                state: ResolverState::Uninitialized,
                context: CommunityContext::empty(),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, ResolverInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ResolverState {
        self.inner().state
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == ResolverState::Loaded
    }

    /// Wait for session readiness, bounded by the policy ceiling.
    ///
    /// Never fails into the caller: a timeout is logged and leaves the
    /// resolver in [`ResolverState::TimedOut`].
    pub async fn initialize(&self) -> ResolverState {
        if self.is_loaded() {
            return ResolverState::Loaded;
        }
        let ceiling = self.wait.ceiling();
        let state = match tokio::time::timeout(ceiling, self.session.wait_ready()).await {
            Ok(session) => {
                info!(
                    authenticated = session.is_authenticated(),
                    role = ?session.role(),
                    "context resolved"
                );
                ResolverState::Loaded
            }
            Err(_) => {
                error!(
                    attempts = self.wait.attempts,
                    interval_ms = self.wait.interval_ms,
                    "session never became ready, context unavailable"
                );
                ResolverState::TimedOut
            }
        };
        self.inner().state = state;
        state
    }

    pub fn identity(&self) -> Option<UserIdentity> {
        self.session.identity()
    }

    pub fn role(&self) -> Option<Role> {
        self.session.snapshot().role()
    }

    pub fn community_id(&self) -> Option<CommunityId> {
        self.session.snapshot().community_id().cloned()
    }

    pub fn can_access_page(&self, path: &str) -> bool {
        can_access_page(self.role(), path)
    }

    pub fn data_loading_strategy(&self) -> DataLoadingStrategy {
        DataLoadingStrategy::for_role(self.role())
    }

    /// Load and merge summary and insights for the viewer's community.
    ///
    /// Both loads go through the cache concurrently. A viewer without a
    /// community gets [`CommunityContext::empty`].
    pub async fn load_community_context(
        &self,
        force_refresh: bool,
    ) -> Result<CommunityContext, LoadError> {
        let Some(community) = self.community_id() else {
            debug!("no community for viewer, using empty context");
            let empty = CommunityContext::empty();
            self.inner().context = empty.clone();
            return Ok(empty);
        };

        let (summary, insights) = futures_util::try_join!(
            self.data.community_summary(&community, force_refresh),
            self.data.community_insights(&community, force_refresh),
        )?;

        let context = CommunityContext {
            community_id: Some(community),
            summary: Some(summary),
            insights: Some(insights),
        };
        self.inner().context = context.clone();
        Ok(context)
    }

    /// Last context produced by [`Self::load_community_context`].
    pub fn community_context(&self) -> CommunityContext {
        self.inner().context.clone()
    }

    pub fn data(&self) -> &DashboardData {
        &self.data
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }
}

impl std::fmt::Debug for ContextResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextResolver")
            .field("state", &self.state())
            .field("role", &self.role())
            .finish_non_exhaustive()
    }
}
