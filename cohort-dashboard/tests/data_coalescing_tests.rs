//! Coalescing and invalidation through the dashboard data facade.

use cohort_cache::{CacheKey, CoalescingLoader};
use cohort_dashboard::service::{COMMUNITY_INSIGHTS_OP, COMMUNITY_SUMMARY_OP, MEMBERS_OP};
use cohort_dashboard::{CommunitySummary, DashboardData};
use cohort_test_utils::fixtures;
use cohort_test_utils::{CommunityId, LoadError, MockDashboardService, PageHarness, Role};
use std::sync::Arc;
use std::time::Duration;

fn slow_data() -> (DashboardData, Arc<MockDashboardService>) {
    let service = Arc::new(MockDashboardService::new().with_latency(Duration::from_millis(100)));
    (DashboardData::new(CoalescingLoader::with_defaults(), service.clone()), service)
}

#[tokio::test(start_paused = true)]
async fn test_simultaneous_summary_reads_share_one_call() {
    let (data, service) = slow_data();
    let c1 = CommunityId::new("C1");

    let (first, second) = tokio::join!(
        data.community_summary(&c1, false),
        data.community_summary(&c1, false)
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(service.calls(COMMUNITY_SUMMARY_OP), 1);
    assert_eq!(data.loader().stats().coalesced, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalidating_key_forces_one_new_call() {
    let (data, service) = slow_data();
    let c1 = CommunityId::new("C1");
    data.community_summary(&c1, false).await.unwrap();

    assert!(data.loader().invalidate(&CacheKey::raw("community-summary-C1")));
    let (a, b) = tokio::join!(
        data.community_summary(&c1, false),
        data.community_summary(&c1, false)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(service.calls(COMMUNITY_SUMMARY_OP), 2);
}

#[tokio::test]
async fn test_failed_load_is_shared_and_not_cached() {
    let service = Arc::new(MockDashboardService::new());
    let data = DashboardData::new(CoalescingLoader::with_defaults(), service.clone());
    let c1 = CommunityId::new("C1");
    service.fail(COMMUNITY_SUMMARY_OP, LoadError::transport("connection refused"));

    let err = data.community_summary(&c1, false).await.unwrap_err();
    assert!(matches!(err, LoadError::Transport { .. }));
    assert!(data
        .loader()
        .peek::<CommunitySummary>(&CacheKey::raw("community-summary-C1"))
        .is_none());

    service.recover(COMMUNITY_SUMMARY_OP);
    assert!(data.community_summary(&c1, false).await.is_ok());
    assert_eq!(service.calls(COMMUNITY_SUMMARY_OP), 2);
}

#[tokio::test]
async fn test_force_refresh_bypasses_fresh_entry() {
    let harness = PageHarness::signed_in(fixtures::mentor()).await;
    let c1 = fixtures::community();

    harness.data.community_insights(&c1, false).await.unwrap();
    harness.data.community_insights(&c1, false).await.unwrap();
    harness.data.community_insights(&c1, true).await.unwrap();

    assert_eq!(harness.service.calls(COMMUNITY_INSIGHTS_OP), 2);
}

#[tokio::test]
async fn test_member_filters_are_cached_separately() {
    let service = Arc::new(MockDashboardService::new().with_members(vec![
        fixtures::member("m-1", Role::Mentor),
        fixtures::member("s-1", Role::Student),
        fixtures::member("s-2", Role::Student),
    ]));
    let data = DashboardData::new(CoalescingLoader::with_defaults(), service.clone());
    let c1 = fixtures::community();

    assert_eq!(data.mentors(Some(&c1), false).await.unwrap().len(), 1);
    assert_eq!(data.students(Some(&c1), false).await.unwrap().len(), 2);
    assert_eq!(data.users(false).await.unwrap().len(), 3);
    data.students(Some(&c1), false).await.unwrap();
    assert_eq!(service.calls(MEMBERS_OP), 3);

    assert_eq!(data.loader().invalidate_prefix("members"), 3);
    data.students(Some(&c1), false).await.unwrap();
    assert_eq!(service.calls(MEMBERS_OP), 4);
}
