//! Typed data service and the cache-backed facade every page reads through.

use crate::types::{
    AnalyticsSnapshot, CommunityInsights, CommunitySummary, DashboardPayload, MemberQuery,
    MemberSummary, PersonalOverview,
};
use async_trait::async_trait;
use cohort_cache::{CacheKey, CoalescingLoader};
use cohort_core::{CommunityId, DataLoadingStrategy, LoadError, Role, UserId};
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use std::sync::Arc;
use tracing::{debug, info};

pub const COMMUNITY_SUMMARY_OP: &str = "community-summary";
pub const COMMUNITY_INSIGHTS_OP: &str = "community-insights";
pub const DASHBOARD_OP: &str = "dashboard";
pub const MEMBERS_OP: &str = "members";
pub const ANALYTICS_OP: &str = "analytics";
pub const PERSONAL_OP: &str = "personal";

/// Remote calls behind the dashboard. Implementations do no caching.
#[async_trait]
pub trait DashboardService: Send + Sync {
    async fn community_summary(&self, community: &CommunityId) -> Result<CommunitySummary, LoadError>;
    async fn community_insights(&self, community: &CommunityId) -> Result<CommunityInsights, LoadError>;
    async fn dashboard(&self, user: &UserId) -> Result<DashboardPayload, LoadError>;
    async fn members(&self, query: &MemberQuery) -> Result<Vec<MemberSummary>, LoadError>;
    async fn analytics(&self, community: &CommunityId) -> Result<AnalyticsSnapshot, LoadError>;
    async fn personal_overview(&self, user: &UserId) -> Result<PersonalOverview, LoadError>;
}

/// Outcome of [`DashboardData::refresh_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshSummary {
    pub cleared: usize,
    pub refreshed: Vec<&'static str>,
    pub failed: Vec<(&'static str, LoadError)>,
}

impl RefreshSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Every dashboard read, routed through the shared [`CoalescingLoader`].
#[derive(Clone)]
pub struct DashboardData {
    loader: CoalescingLoader,
    service: Arc<dyn DashboardService>,
}

impl DashboardData {
    pub fn new(loader: CoalescingLoader, service: Arc<dyn DashboardService>) -> Self {
        Self { loader, service }
    }

    pub fn loader(&self) -> &CoalescingLoader {
        &self.loader
    }

    pub async fn community_summary(
        &self,
        community: &CommunityId,
        force_refresh: bool,
    ) -> Result<CommunitySummary, LoadError> {
        let key = CacheKey::scoped(COMMUNITY_SUMMARY_OP, community);
        let service = self.service.clone();
        let community = community.clone();
        self.loader
            .get_or_load(
                &key,
                move || async move { service.community_summary(&community).await },
                force_refresh,
            )
            .await
    }

    pub async fn community_insights(
        &self,
        community: &CommunityId,
        force_refresh: bool,
    ) -> Result<CommunityInsights, LoadError> {
        let key = CacheKey::scoped(COMMUNITY_INSIGHTS_OP, community);
        let service = self.service.clone();
        let community = community.clone();
        self.loader
            .get_or_load(
                &key,
                move || async move { service.community_insights(&community).await },
                force_refresh,
            )
            .await
    }

    pub async fn dashboard(
        &self,
        user: &UserId,
        force_refresh: bool,
    ) -> Result<DashboardPayload, LoadError> {
        let key = CacheKey::scoped(DASHBOARD_OP, user);
        let service = self.service.clone();
        let user = user.clone();
        self.loader
            .get_or_load(&key, move || async move { service.dashboard(&user).await }, force_refresh)
            .await
    }

    pub async fn members(
        &self,
        query: &MemberQuery,
        force_refresh: bool,
    ) -> Result<Vec<MemberSummary>, LoadError> {
        let key = CacheKey::for_operation(MEMBERS_OP, query)
            .map_err(|err| LoadError::decode(err.to_string()))?;
        let service = self.service.clone();
        let query = query.clone();
        self.loader
            .get_or_load(&key, move || async move { service.members(&query).await }, force_refresh)
            .await
    }

    pub async fn users(&self, force_refresh: bool) -> Result<Vec<MemberSummary>, LoadError> {
        self.members(&MemberQuery::all(), force_refresh).await
    }

    pub async fn mentors(
        &self,
        community: Option<&CommunityId>,
        force_refresh: bool,
    ) -> Result<Vec<MemberSummary>, LoadError> {
        self.members(&MemberQuery::role_in(Role::Mentor, community), force_refresh)
            .await
    }

    pub async fn students(
        &self,
        community: Option<&CommunityId>,
        force_refresh: bool,
    ) -> Result<Vec<MemberSummary>, LoadError> {
        self.members(&MemberQuery::role_in(Role::Student, community), force_refresh)
            .await
    }

    pub async fn analytics(
        &self,
        community: &CommunityId,
        force_refresh: bool,
    ) -> Result<AnalyticsSnapshot, LoadError> {
        let key = CacheKey::scoped(ANALYTICS_OP, community);
        let service = self.service.clone();
        let community = community.clone();
        self.loader
            .get_or_load(
                &key,
                move || async move { service.analytics(&community).await },
                force_refresh,
            )
            .await
    }

    pub async fn personal_overview(
        &self,
        user: &UserId,
        force_refresh: bool,
    ) -> Result<PersonalOverview, LoadError> {
        let key = CacheKey::scoped(PERSONAL_OP, user);
        let service = self.service.clone();
        let user = user.clone();
        self.loader
            .get_or_load(
                &key,
                move || async move { service.personal_overview(&user).await },
                force_refresh,
            )
            .await
    }

    /// Drop the community-scoped entries for one community.
    pub fn invalidate_community(&self, community: &CommunityId) -> usize {
        [COMMUNITY_SUMMARY_OP, COMMUNITY_INSIGHTS_OP, ANALYTICS_OP]
            .into_iter()
            .filter(|op| self.loader.invalidate(&CacheKey::scoped(op, community)))
            .count()
    }

    /// Drop every member listing regardless of filter.
    pub fn invalidate_members(&self) -> usize {
        self.loader.invalidate_prefix(MEMBERS_OP)
    }

    /// Clear the cache, then re-issue the strategy's batch with
    /// `force_refresh = true`. Loads run concurrently; one failure does not
    /// stop the others.
    pub async fn refresh_all(
        &self,
        strategy: DataLoadingStrategy,
        user: Option<&UserId>,
        community: Option<&CommunityId>,
    ) -> RefreshSummary {
        let cleared = self.loader.clear();
        let mut batch: Vec<(&'static str, BoxFuture<'_, Result<(), LoadError>>)> = Vec::new();

        if let Some(user) = user {
            batch.push((DASHBOARD_OP, self.dashboard(user, true).map(discard).boxed()));
            if strategy.load_personal {
                batch.push((PERSONAL_OP, self.personal_overview(user, true).map(discard).boxed()));
            }
        }
        if strategy.load_users {
            batch.push(("users", self.users(true).map(discard).boxed()));
        }
        if strategy.load_mentors {
            batch.push(("mentors", self.mentors(community, true).map(discard).boxed()));
        }
        if strategy.load_students {
            batch.push(("students", self.students(community, true).map(discard).boxed()));
        }
        if let Some(community) = community {
            if strategy.load_community {
                batch.push((
                    COMMUNITY_SUMMARY_OP,
                    self.community_summary(community, true).map(discard).boxed(),
                ));
                batch.push((
                    COMMUNITY_INSIGHTS_OP,
                    self.community_insights(community, true).map(discard).boxed(),
                ));
            }
            if strategy.load_analytics {
                batch.push((ANALYTICS_OP, self.analytics(community, true).map(discard).boxed()));
            }
        }

        let (names, loads): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
        debug!(cleared, loads = names.len(), "refreshing dashboard data");
        let results = join_all(loads).await;

        let mut summary = RefreshSummary {
            cleared,
            ..RefreshSummary::default()
        };
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => summary.refreshed.push(name),
                Err(err) => summary.failed.push((name, err)),
            }
        }
        info!(
            refreshed = summary.refreshed.len(),
            failed = summary.failed.len(),
            "dashboard refresh finished"
        );
        summary
    }
}

fn discard<T>(result: Result<T, LoadError>) -> Result<(), LoadError> {
    result.map(|_| ())
}

impl std::fmt::Debug for DashboardData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardData")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}
