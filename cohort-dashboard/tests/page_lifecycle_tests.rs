//! Page controller lifecycle scenarios.

use async_trait::async_trait;
use cohort_cache::CacheKey;
use cohort_dashboard::service::{COMMUNITY_SUMMARY_OP, DASHBOARD_OP, MEMBERS_OP};
use cohort_dashboard::{
    CommunitySummary, DashboardPage, GuardDecision, PageContext, PageController, PageOutcome,
    RealtimeEvent, RoleOverviewPage, RouteTable, SessionCheck, Visit,
};
use cohort_test_utils::fixtures;
use cohort_test_utils::{
    CountingDependency, LoadError, PageError, PageHarness, PageLifecycleState, RenderError,
    RetryPolicy, Role, SurfaceEvent, ToggleDependency,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Page that only counts how often its body is rendered.
#[derive(Default)]
struct CountingPage {
    role: Option<Role>,
    renders: AtomicUsize,
}

impl CountingPage {
    fn for_role(role: Role) -> Arc<Self> {
        Arc::new(Self {
            role: Some(role),
            renders: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DashboardPage for CountingPage {
    fn name(&self) -> &str {
        "counting"
    }

    fn required_role(&self) -> Option<Role> {
        self.role
    }

    async fn render_dashboard_content(&self, _ctx: &PageContext<'_>) -> Result<(), RenderError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn settle<F: Fn() -> bool>(done: F) {
    for _ in 0..50 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_wrong_role_redirects_home_without_rendering() {
    let harness = PageHarness::signed_in(fixtures::mentor()).await;
    let page = CountingPage::for_role(Role::Student);
    let mut controller = PageController::new(page.clone(), harness.services.clone());

    let outcome = controller.initialize().await;

    assert_eq!(
        outcome,
        PageOutcome::Redirected {
            target: "/mentor/dashboard".to_string()
        }
    );
    assert_eq!(harness.navigator.redirects(), vec!["/mentor/dashboard".to_string()]);
    assert_eq!(controller.state(), PageLifecycleState::CheckingPermissions);
    assert_eq!(page.renders.load(Ordering::SeqCst), 0);
    assert_eq!(harness.service.calls(DASHBOARD_OP), 0);
}

#[tokio::test]
async fn test_matching_role_walks_every_state() {
    let harness = PageHarness::signed_in(fixtures::student()).await;
    let page = CountingPage::for_role(Role::Student);
    let mut controller = PageController::new(page.clone(), harness.services.clone());

    assert_eq!(controller.initialize().await, PageOutcome::Ready(Default::default()));
    assert_eq!(
        controller.history(),
        &[
            PageLifecycleState::WaitingForDependencies,
            PageLifecycleState::CheckingAuth,
            PageLifecycleState::CheckingPermissions,
            PageLifecycleState::LoadingData,
            PageLifecycleState::Rendering,
            PageLifecycleState::Ready,
        ]
    );
    assert_eq!(page.renders.load(Ordering::SeqCst), 1);
    assert!(controller.payload().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_dependencies_never_ready_fail_after_ceiling() {
    let harness = PageHarness::signed_in(fixtures::student())
        .await
        .with_dependency_wait(RetryPolicy::new(10, 500));
    let feed = Arc::new(CountingDependency::never("realtime"));
    let mut controller =
        PageController::new(CountingPage::for_role(Role::Student), harness.services.clone())
            .with_dependency(feed.clone());

    let calls_before = harness.service.total_calls();
    let started = tokio::time::Instant::now();
    let outcome = controller.initialize().await;

    assert_eq!(started.elapsed(), Duration::from_millis(5_000));
    assert_eq!(feed.probes(), 10);
    assert_eq!(
        outcome,
        PageOutcome::Failed(PageError::DependenciesUnavailable {
            attempts: 10,
            missing: vec!["realtime".to_string()],
        })
    );
    assert_eq!(controller.state(), PageLifecycleState::Failed);
    assert!(harness
        .surface
        .events()
        .iter()
        .any(|event| matches!(event, SurfaceEvent::Error { .. })));
    assert_eq!(harness.service.calls(DASHBOARD_OP), 0);
    assert_eq!(harness.service.total_calls(), calls_before);
}

#[tokio::test(start_paused = true)]
async fn test_late_dependency_is_picked_up() {
    let harness = PageHarness::signed_in(fixtures::student())
        .await
        .with_dependency_wait(RetryPolicy::new(10, 500));
    let feed = Arc::new(CountingDependency::ready_on("realtime", 4));
    let mut controller =
        PageController::new(CountingPage::for_role(Role::Student), harness.services.clone())
            .with_dependency(feed.clone());

    let started = tokio::time::Instant::now();
    assert!(controller.initialize().await.is_ready());
    assert_eq!(started.elapsed(), Duration::from_millis(1_500));
}

#[tokio::test(start_paused = true)]
async fn test_dependency_flipped_ready_mid_wait() {
    let harness = PageHarness::signed_in(fixtures::student())
        .await
        .with_dependency_wait(RetryPolicy::new(10, 500));
    let feed = Arc::new(ToggleDependency::new("realtime", false));
    let mut controller =
        PageController::new(CountingPage::for_role(Role::Student), harness.services.clone())
            .with_dependency(feed.clone());

    let started = tokio::time::Instant::now();
    let (outcome, ()) = tokio::join!(controller.initialize(), async {
        tokio::time::sleep(Duration::from_millis(700)).await;
        feed.set_ready(true);
    });

    assert!(outcome.is_ready());
    assert_eq!(started.elapsed(), Duration::from_millis(1_000));
}

#[tokio::test]
async fn test_signed_out_viewer_sees_login_prompt() {
    let harness = PageHarness::signed_out().await;
    let page = CountingPage::for_role(Role::Student);
    let mut controller = PageController::new(page.clone(), harness.services.clone());

    assert_eq!(controller.initialize().await, PageOutcome::LoginRequired);
    assert_eq!(controller.state(), PageLifecycleState::CheckingAuth);
    assert!(harness
        .surface
        .events()
        .contains(&SurfaceEvent::LoginPrompt("counting".to_string())));
    assert_eq!(page.renders.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_payload_failure_moves_to_failed() {
    let harness = PageHarness::signed_in(fixtures::student()).await;
    let unavailable = LoadError::Status {
        status: 503,
        message: "maintenance".to_string(),
    };
    harness.service.fail(DASHBOARD_OP, unavailable.clone());
    let mut controller =
        PageController::new(CountingPage::for_role(Role::Student), harness.services.clone());

    assert_eq!(
        controller.initialize().await,
        PageOutcome::Failed(PageError::Load(unavailable))
    );
    assert_eq!(controller.state(), PageLifecycleState::Failed);
    assert_eq!(
        controller.refresh().await,
        Err(PageError::NotReady {
            state: PageLifecycleState::Failed
        })
    );
}

#[tokio::test]
async fn test_section_failures_are_contained() {
    let harness = PageHarness::signed_in(fixtures::student()).await;
    harness.surface.fail_section("stats");
    harness
        .service
        .fail(MEMBERS_OP, LoadError::transport("members offline"));
    let mut controller = PageController::new(
        Arc::new(RoleOverviewPage::new(Role::Student)),
        harness.services.clone(),
    );

    let PageOutcome::Ready(report) = controller.initialize().await else {
        panic!("page should still reach Ready");
    };

    assert_eq!(report.failed_sections, vec!["stats".to_string(), "mentors".to_string()]);
    assert_eq!(harness.surface.sections(), vec!["community".to_string()]);
    assert_eq!(
        harness.surface.fallbacks(),
        vec!["stats".to_string(), "mentors".to_string()]
    );
    assert_eq!(controller.state(), PageLifecycleState::Ready);
}

#[tokio::test]
async fn test_refresh_reloads_only_from_ready() {
    let harness = PageHarness::signed_in(fixtures::student()).await;
    let page = CountingPage::for_role(Role::Student);
    let mut controller = PageController::new(page.clone(), harness.services.clone());

    assert_eq!(
        controller.refresh().await,
        Err(PageError::NotReady {
            state: PageLifecycleState::Uninitialized
        })
    );

    controller.initialize().await;
    assert!(controller.refresh().await.unwrap().is_clean());
    assert_eq!(harness.service.calls(DASHBOARD_OP), 2);
    assert_eq!(page.renders.load(Ordering::SeqCst), 2);
    assert_eq!(controller.state(), PageLifecycleState::Ready);

    controller.destroy();
    assert_eq!(controller.refresh().await, Err(PageError::Destroyed));
    assert_eq!(
        controller.initialize().await,
        PageOutcome::Failed(PageError::Destroyed)
    );
}

#[tokio::test]
async fn test_destroy_releases_realtime_listeners() {
    let harness = PageHarness::signed_in(fixtures::mentor()).await;
    let mut controller = PageController::new(
        Arc::new(RoleOverviewPage::new(Role::Mentor)),
        harness.services.clone(),
    );
    assert!(controller.initialize().await.is_ready());
    assert_eq!(controller.subscriptions().len(), 1);
    assert_eq!(harness.realtime.listener_count(), 1);

    controller.destroy();
    controller.destroy();
    assert!(controller.is_destroyed());
    assert!(controller.subscriptions().is_empty());

    settle(|| harness.realtime.listener_count() == 0).await;
    assert_eq!(harness.realtime.listener_count(), 0);
}

#[tokio::test]
async fn test_logout_closes_ready_page_and_drops_cached_reads() {
    let harness = PageHarness::signed_in(fixtures::mentor()).await;
    let page = Arc::new(RoleOverviewPage::new(Role::Mentor));
    let name = page.name().to_string();
    let mut controller = PageController::new(page, harness.services.clone());
    assert!(controller.initialize().await.is_ready());
    assert_eq!(controller.revalidate(), SessionCheck::Unchanged);

    let summary = CacheKey::raw("community-summary-C1");
    assert!(harness.data.loader().peek::<CommunitySummary>(&summary).is_some());

    harness.session.logout().await.unwrap();

    assert_eq!(controller.revalidate(), SessionCheck::Ended);
    assert!(controller.is_destroyed());
    assert!(controller.payload().is_none());
    assert!(controller.subscriptions().is_empty());
    assert!(harness.data.loader().peek::<CommunitySummary>(&summary).is_none());
    assert_eq!(harness.data.loader().stats().entry_count, 0);
    assert!(harness.surface.events().contains(&SurfaceEvent::LoginPrompt(name)));
    assert_eq!(controller.refresh().await, Err(PageError::Destroyed));

    settle(|| harness.realtime.listener_count() == 0).await;
    assert_eq!(harness.realtime.listener_count(), 0);
}

#[tokio::test]
async fn test_community_event_invalidates_cached_summary() {
    let harness = PageHarness::signed_in(fixtures::mentor()).await;
    let mut controller = PageController::new(
        Arc::new(RoleOverviewPage::new(Role::Mentor)),
        harness.services.clone(),
    );
    assert!(controller.initialize().await.is_ready());
    assert_eq!(harness.service.calls(COMMUNITY_SUMMARY_OP), 1);

    let key = CacheKey::raw("community-summary-C1");
    let cached = || harness.data.loader().peek::<CommunitySummary>(&key).is_some();
    assert!(cached());

    harness.realtime.publish(RealtimeEvent::CommunityUpdated {
        community_id: fixtures::community(),
    });
    settle(|| !cached()).await;
    assert!(!cached());

    harness.resolver.load_community_context(false).await.unwrap();
    assert_eq!(harness.service.calls(COMMUNITY_SUMMARY_OP), 2);
}

#[tokio::test]
async fn test_route_table_guards_then_runs_page() {
    let harness = PageHarness::signed_in(fixtures::mentor()).await;
    let guard = harness.guard();
    let table = RouteTable::standard();

    match table.open("/student/dashboard", &guard, &harness.services).await {
        Some(Visit::Denied(decision)) => assert_eq!(
            decision,
            GuardDecision::Unauthorized {
                role: Some(Role::Mentor)
            }
        ),
        other => panic!("expected denial, got {:?}", other),
    }
    assert_eq!(harness.navigator.redirects(), vec!["/unauthorized".to_string()]);

    match table.open("/mentor/dashboard", &guard, &harness.services).await {
        Some(Visit::Opened { outcome, .. }) => assert!(outcome.is_ready()),
        other => panic!("expected mentor page, got {:?}", other),
    }

    // The admin area admits mentors, but the admin overview is for admins.
    match table.open("/admin/dashboard", &guard, &harness.services).await {
        Some(Visit::Opened { outcome, .. }) => assert_eq!(
            outcome,
            PageOutcome::Redirected {
                target: "/mentor/dashboard".to_string()
            }
        ),
        other => panic!("expected redirect, got {:?}", other),
    }

    assert!(table.open("/settings", &guard, &harness.services).await.is_none());
}
