//! Cohort Test Utilities
//!
//! Shared test infrastructure for the Cohort workspace:
//! - Scripted session backend and mock dashboard service
//! - Recording navigator and surface
//! - Controllable page dependencies
//! - Fixtures and a ready-made page harness
//! - Proptest generators for roles, identities and paths

pub use cohort_core::{
    CommunityId, LoadError, PageArea, PageError, PageLifecycleState, RenderError, RetryPolicy,
    Role, RouteRequirement, Session, UserId, UserIdentity,
};

use async_trait::async_trait;
use cohort_cache::CoalescingLoader;
use cohort_dashboard::service::{
    ANALYTICS_OP, COMMUNITY_INSIGHTS_OP, COMMUNITY_SUMMARY_OP, DASHBOARD_OP, MEMBERS_OP,
    PERSONAL_OP,
};
use cohort_dashboard::{
    AnalyticsSnapshot, CommunityInsights, CommunitySummary, ContextResolver, DashboardData,
    DashboardPayload, DashboardService, Dependency, MemberQuery, MemberSummary, Navigator,
    PageServices, PersonalOverview, RealtimeHub, RedirectMarker, RouteGuard, Surface,
};
use cohort_session::{
    CredentialStore, IdentityOutcome, MemoryCredentialStore, SessionBackend, SessionStore,
    StoredCredentials,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// SESSION BACKEND
// ============================================================================

/// Session backend that replays queued answers.
///
/// When a queue runs dry the fallback answer is used: the configured
/// identity for `current_identity`, rejection for `refresh_credentials`.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    identities: Mutex<VecDeque<Result<IdentityOutcome, LoadError>>>,
    refreshes: Mutex<VecDeque<Result<(), LoadError>>>,
    fallback: Option<UserIdentity>,
    latency: Option<Duration>,
    identity_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answers with `identity`.
    pub fn authenticated(identity: UserIdentity) -> Self {
        Self {
            fallback: Some(identity),
            ..Self::default()
        }
    }

    /// Always answers unauthenticated and rejects refreshes.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Delay every identity request, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push_identity(&self, outcome: Result<IdentityOutcome, LoadError>) -> &Self {
        self.identities.lock().unwrap().push_back(outcome);
        self
    }

    pub fn push_refresh(&self, outcome: Result<(), LoadError>) -> &Self {
        self.refreshes.lock().unwrap().push_back(outcome);
        self
    }

    pub fn identity_calls(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionBackend for ScriptedBackend {
    async fn current_identity(&self) -> Result<IdentityOutcome, LoadError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let queued = self.identities.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            Ok(match &self.fallback {
                Some(identity) => IdentityOutcome::Authenticated(identity.clone()),
                None => IdentityOutcome::Unauthenticated,
            })
        })
    }

    async fn refresh_credentials(&self) -> Result<(), LoadError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refreshes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LoadError::Unauthenticated))
    }

    async fn sign_out(&self) -> Result<(), LoadError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// DASHBOARD SERVICE
// ============================================================================

/// In-memory dashboard backend with per-operation call counters.
#[derive(Debug, Default)]
pub struct MockDashboardService {
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, LoadError>>,
    members: Mutex<Vec<MemberSummary>>,
    latency: Option<Duration>,
}

impl MockDashboardService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_members(self, members: Vec<MemberSummary>) -> Self {
        *self.members.lock().unwrap() = members;
        self
    }

    /// Make `op` fail with `err` until [`Self::recover`] is called.
    pub fn fail(&self, op: &'static str, err: LoadError) {
        self.failures.lock().unwrap().insert(op, err);
    }

    pub fn recover(&self, op: &'static str) {
        self.failures.lock().unwrap().remove(op);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    async fn enter(&self, op: &'static str) -> Result<(), LoadError> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.failures.lock().unwrap().get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DashboardService for MockDashboardService {
    async fn community_summary(&self, community: &CommunityId) -> Result<CommunitySummary, LoadError> {
        self.enter(COMMUNITY_SUMMARY_OP).await?;
        Ok(fixtures::community_summary(community))
    }

    async fn community_insights(&self, community: &CommunityId) -> Result<CommunityInsights, LoadError> {
        self.enter(COMMUNITY_INSIGHTS_OP).await?;
        Ok(fixtures::community_insights(community))
    }

    async fn dashboard(&self, user: &UserId) -> Result<DashboardPayload, LoadError> {
        self.enter(DASHBOARD_OP).await?;
        Ok(fixtures::dashboard_payload(user))
    }

    async fn members(&self, query: &MemberQuery) -> Result<Vec<MemberSummary>, LoadError> {
        self.enter(MEMBERS_OP).await?;
        let members = self.members.lock().unwrap();
        Ok(members
            .iter()
            .filter(|member| query.role.map_or(true, |role| member.role == role))
            .filter(|member| {
                query
                    .community_id
                    .as_ref()
                    .map_or(true, |community| member.community_id.as_ref() == Some(community))
            })
            .cloned()
            .collect())
    }

    async fn analytics(&self, community: &CommunityId) -> Result<AnalyticsSnapshot, LoadError> {
        self.enter(ANALYTICS_OP).await?;
        Ok(AnalyticsSnapshot {
            community_id: community.clone(),
            metrics: [("retention".to_string(), 0.8)].into_iter().collect(),
            captured_at: chrono::Utc::now(),
        })
    }

    async fn personal_overview(&self, user: &UserId) -> Result<PersonalOverview, LoadError> {
        self.enter(PERSONAL_OP).await?;
        Ok(PersonalOverview {
            user_id: user.clone(),
            goals: vec!["finish the capstone".to_string()],
            completed_sessions: 3,
        })
    }
}

// ============================================================================
// NAVIGATION AND OUTPUT
// ============================================================================

/// Navigator that records every redirect and moves to its target.
#[derive(Debug)]
pub struct RecordingNavigator {
    current: Mutex<String>,
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(path.into()),
            redirects: Mutex::new(Vec::new()),
        }
    }

    pub fn set_current(&self, path: impl Into<String>) {
        *self.current.lock().unwrap() = path.into();
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    fn redirect(&self, target: &str) {
        self.redirects.lock().unwrap().push(target.to_string());
        self.set_current(target);
    }
}

/// One call observed by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Loading(String),
    LoginPrompt(String),
    Error { page: String, message: String },
    Profile(String),
    Stats(usize),
    Section { name: String, lines: Vec<String> },
    Fallback(String),
}

/// Surface that records calls. Sections named via [`Self::fail_section`]
/// (including "profile" and "stats") fail to draw.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_section(&self, section: impl Into<String>) {
        self.failing.lock().unwrap().insert(section.into());
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn sections(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SurfaceEvent::Section { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn fallbacks(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SurfaceEvent::Fallback(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: SurfaceEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn check(&self, section: &str) -> Result<(), RenderError> {
        if self.failing.lock().unwrap().contains(section) {
            return Err(RenderError::section(section, "surface refused to draw"));
        }
        Ok(())
    }
}

impl Surface for RecordingSurface {
    fn show_loading(&self, page: &str) {
        self.record(SurfaceEvent::Loading(page.to_string()));
    }

    fn show_login_prompt(&self, page: &str) {
        self.record(SurfaceEvent::LoginPrompt(page.to_string()));
    }

    fn show_error(&self, page: &str, error: &PageError) {
        self.record(SurfaceEvent::Error {
            page: page.to_string(),
            message: error.to_string(),
        });
    }

    fn render_profile(&self, profile: &cohort_dashboard::ProfileCard) -> Result<(), RenderError> {
        self.check("profile")?;
        self.record(SurfaceEvent::Profile(profile.display_name.clone()));
        Ok(())
    }

    fn render_stats(&self, stats: &[cohort_dashboard::StatTile]) -> Result<(), RenderError> {
        self.check("stats")?;
        self.record(SurfaceEvent::Stats(stats.len()));
        Ok(())
    }

    fn render_section(&self, section: &str, lines: &[String]) -> Result<(), RenderError> {
        self.check(section)?;
        self.record(SurfaceEvent::Section {
            name: section.to_string(),
            lines: lines.to_vec(),
        });
        Ok(())
    }

    fn show_section_fallback(&self, section: &str, _error: &RenderError) {
        self.record(SurfaceEvent::Fallback(section.to_string()));
    }
}

// ============================================================================
// DEPENDENCIES
// ============================================================================

/// Dependency whose readiness is flipped by the test.
#[derive(Debug)]
pub struct ToggleDependency {
    name: String,
    ready: AtomicBool,
}

impl ToggleDependency {
    pub fn new(name: impl Into<String>, ready: bool) -> Self {
        Self {
            name: name.into(),
            ready: AtomicBool::new(ready),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl Dependency for ToggleDependency {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Dependency that becomes ready on probe `ready_on` and counts probes.
#[derive(Debug)]
pub struct CountingDependency {
    name: String,
    ready_on: u32,
    probes: AtomicU32,
}

impl CountingDependency {
    pub fn ready_on(name: impl Into<String>, probe: u32) -> Self {
        Self {
            name: name.into(),
            ready_on: probe,
            probes: AtomicU32::new(0),
        }
    }

    pub fn never(name: impl Into<String>) -> Self {
        Self::ready_on(name, u32::MAX)
    }

    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }
}

impl Dependency for CountingDependency {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst) + 1 >= self.ready_on
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Every collaborator a page needs, wired to mocks.
pub struct PageHarness {
    pub backend: Arc<ScriptedBackend>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub session: Arc<SessionStore>,
    pub service: Arc<MockDashboardService>,
    pub data: DashboardData,
    pub resolver: Arc<ContextResolver>,
    pub navigator: Arc<RecordingNavigator>,
    pub surface: Arc<RecordingSurface>,
    pub realtime: RealtimeHub,
    pub marker: Arc<RedirectMarker>,
    pub services: PageServices,
}

impl PageHarness {
    /// Harness with a not-yet-bootstrapped session.
    pub fn new(backend: ScriptedBackend, service: MockDashboardService) -> Self {
        let backend = Arc::new(backend);
        let credentials = Arc::new(MemoryCredentialStore::with_credentials(
            StoredCredentials::new("test-access-token"),
        ));
        let store: Arc<dyn CredentialStore> = credentials.clone();
        let session = Arc::new(SessionStore::new(backend.clone(), store));
        let service = Arc::new(service);
        let data = DashboardData::new(CoalescingLoader::with_defaults(), service.clone());
        let resolver = Arc::new(ContextResolver::new(
            session.clone(),
            data.clone(),
            RetryPolicy::context_default(),
        ));
        let navigator = Arc::new(RecordingNavigator::at("/"));
        let surface = Arc::new(RecordingSurface::new());
        let realtime = RealtimeHub::default();
        let services = PageServices {
            session: session.clone(),
            resolver: resolver.clone(),
            data: data.clone(),
            navigator: navigator.clone(),
            surface: surface.clone(),
            realtime: realtime.clone(),
            dependency_wait: RetryPolicy::dependency_default(),
        };
        Self {
            backend,
            credentials,
            session,
            service,
            data,
            resolver,
            navigator,
            surface,
            realtime,
            marker: Arc::new(RedirectMarker::new()),
            services,
        }
    }

    /// Bootstrapped session for `identity` and an initialized resolver.
    pub async fn signed_in(identity: UserIdentity) -> Self {
        let harness = Self::new(
            ScriptedBackend::authenticated(identity),
            MockDashboardService::new(),
        );
        harness.start().await;
        harness
    }

    /// Bootstrapped session with nobody signed in.
    pub async fn signed_out() -> Self {
        let harness = Self::new(ScriptedBackend::anonymous(), MockDashboardService::new());
        harness.start().await;
        harness
    }

    pub async fn start(&self) {
        self.session.bootstrap().await;
        self.resolver.initialize().await;
    }

    pub fn with_dependency_wait(mut self, policy: RetryPolicy) -> Self {
        self.services.dependency_wait = policy;
        self
    }

    pub fn guard(&self) -> RouteGuard {
        RouteGuard::new(
            self.session.clone(),
            self.navigator.clone(),
            self.marker.clone(),
            "/login",
            "/unauthorized",
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made identities and payloads.

    use super::*;
    use cohort_dashboard::{ProfileCard, StatTile};

    pub const COMMUNITY: &str = "C1";

    pub fn community() -> CommunityId {
        CommunityId::new(COMMUNITY)
    }

    pub fn admin() -> UserIdentity {
        UserIdentity::new(UserId::new("admin-1"), Role::Admin)
            .with_community(COMMUNITY)
            .with_display_name("Ada Admin")
    }

    pub fn mentor() -> UserIdentity {
        UserIdentity::new(UserId::new("mentor-1"), Role::Mentor)
            .with_community(COMMUNITY)
            .with_display_name("Grace Mentor")
    }

    pub fn student() -> UserIdentity {
        UserIdentity::new(UserId::new("student-1"), Role::Student)
            .with_community(COMMUNITY)
            .with_display_name("Linus Student")
    }

    pub fn personal_user() -> UserIdentity {
        UserIdentity::new(UserId::new("personal-1"), Role::PersonalUser)
            .with_display_name("Solo Learner")
    }

    pub fn identity_for(role: Role) -> UserIdentity {
        match role {
            Role::Admin => admin(),
            Role::Mentor => mentor(),
            Role::Student => student(),
            Role::PersonalUser => personal_user(),
        }
    }

    pub fn member(id: &str, role: Role) -> MemberSummary {
        MemberSummary {
            id: UserId::new(id),
            display_name: id.to_string(),
            role,
            community_id: Some(community()),
        }
    }

    pub fn community_summary(community: &CommunityId) -> CommunitySummary {
        CommunitySummary {
            community_id: community.clone(),
            name: "Makers Guild".to_string(),
            member_count: 12,
            mentor_count: 3,
            student_count: 9,
        }
    }

    pub fn community_insights(community: &CommunityId) -> CommunityInsights {
        CommunityInsights {
            community_id: community.clone(),
            active_pairings: 7,
            sessions_this_week: 15,
            engagement_score: 0.72,
        }
    }

    pub fn dashboard_payload(user: &UserId) -> DashboardPayload {
        DashboardPayload {
            user_id: user.clone(),
            profile: ProfileCard {
                display_name: user.to_string(),
                role: Role::Student,
                headline: None,
            },
            stats: vec![StatTile::new("sessions", 4)],
            generated_at: chrono::Utc::now(),
        }
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for roles, identities and paths.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Admin),
            Just(Role::Mentor),
            Just(Role::Student),
            Just(Role::PersonalUser),
        ]
    }

    pub fn arb_opt_role() -> impl Strategy<Value = Option<Role>> {
        proptest::option::of(arb_role())
    }

    pub fn arb_identity() -> impl Strategy<Value = UserIdentity> {
        ("[a-z0-9]{1,12}", arb_role(), proptest::option::of("C[0-9]{1,3}")).prop_map(
            |(id, role, community)| {
                let identity = UserIdentity::new(UserId::new(id), role);
                match community {
                    Some(community) => identity.with_community(community),
                    None => identity,
                }
            },
        )
    }

    /// Paths inside known areas, near misses, and arbitrary strings.
    pub fn arb_path() -> impl Strategy<Value = String> {
        let area = prop_oneof![
            Just("/admin"),
            Just("/mentor"),
            Just("/student"),
            Just("/personal"),
        ];
        prop_oneof![
            (area, "(/[a-z]{1,8}){0,3}").prop_map(|(area, rest)| format!("{}{}", area, rest)),
            "/[a-z]{0,12}(/[a-z]{1,8}){0,2}",
            ".{0,24}",
        ]
    }
}
