//! Page lifecycle: dependency wait, auth, permissions, load, render.

use crate::context::ContextResolver;
use crate::guard::Navigator;
use crate::page::dependency::{wait_for_dependencies, Dependency};
use crate::page::surface::Surface;
use crate::realtime::RealtimeHub;
use crate::service::DashboardData;
use crate::subscriptions::SubscriptionSet;
use crate::types::DashboardPayload;
use async_trait::async_trait;
use cohort_core::{
    DataLoadingStrategy, PageError, PageLifecycleState, RenderError, RetryPolicy, Role,
    UserIdentity,
};
use cohort_session::SessionStore;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Page-specific pieces plugged into the shared lifecycle.
#[async_trait]
pub trait DashboardPage: Send + Sync {
    fn name(&self) -> &str;

    /// Exact role this page is for. `None` admits every signed-in role.
    fn required_role(&self) -> Option<Role> {
        None
    }

    /// Render the page body. Use [`PageContext::section`] so one failing
    /// section does not take the others down.
    async fn render_dashboard_content(&self, ctx: &PageContext<'_>) -> Result<(), RenderError>;

    /// Register long-lived listeners once the page first reaches Ready.
    fn on_ready(
        &self,
        _services: &PageServices,
        _identity: &UserIdentity,
        _subscriptions: &mut SubscriptionSet,
    ) {
    }
}

/// Collaborators shared by every page.
#[derive(Clone)]
pub struct PageServices {
    pub session: Arc<SessionStore>,
    pub resolver: Arc<ContextResolver>,
    pub data: DashboardData,
    pub navigator: Arc<dyn Navigator>,
    pub surface: Arc<dyn Surface>,
    pub realtime: RealtimeHub,
    pub dependency_wait: RetryPolicy,
}

/// View of the loaded page handed to content renderers.
pub struct PageContext<'a> {
    identity: &'a UserIdentity,
    payload: &'a DashboardPayload,
    services: &'a PageServices,
    force_refresh: bool,
    failed: Mutex<Vec<String>>,
}

impl<'a> PageContext<'a> {
    fn new(
        identity: &'a UserIdentity,
        payload: &'a DashboardPayload,
        services: &'a PageServices,
        force_refresh: bool,
    ) -> Self {
        Self {
            identity,
            payload,
            services,
            force_refresh,
            failed: Mutex::new(Vec::new()),
        }
    }

    pub fn identity(&self) -> &UserIdentity {
        self.identity
    }

    pub fn payload(&self) -> &DashboardPayload {
        self.payload
    }

    pub fn resolver(&self) -> &ContextResolver {
        &self.services.resolver
    }

    pub fn data(&self) -> &DashboardData {
        &self.services.data
    }

    pub fn surface(&self) -> &dyn Surface {
        self.services.surface.as_ref()
    }

    pub fn strategy(&self) -> DataLoadingStrategy {
        self.services.resolver.data_loading_strategy()
    }

    /// True while a manual refresh is re-rendering the page.
    pub fn force_refresh(&self) -> bool {
        self.force_refresh
    }

    /// Build and draw one section. A failure shows that section's fallback
    /// and is recorded; it never propagates.
    pub async fn section<F, Fut>(&self, name: &str, build: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>, RenderError>>,
    {
        let drawn = match build().await {
            Ok(lines) => self.surface().render_section(name, &lines),
            Err(err) => Err(err),
        };
        match drawn {
            Ok(()) => true,
            Err(err) => {
                self.contain(name, &err);
                false
            }
        }
    }

    fn contain(&self, section: &str, err: &RenderError) {
        warn!(section, error = %err, "section failed to render");
        self.surface().show_section_fallback(section, err);
        self.failed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(section.to_string());
    }

    fn into_report(self) -> RenderReport {
        RenderReport {
            failed_sections: self
                .failed
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        }
    }
}

/// Sections that fell back during one render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub failed_sections: Vec<String>,
}

impl RenderReport {
    pub fn is_clean(&self) -> bool {
        self.failed_sections.is_empty()
    }
}

/// How an initialisation run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Ready(RenderReport),
    /// No session; the login prompt is showing.
    LoginRequired,
    /// Wrong role; navigated to the viewer's own home.
    Redirected { target: String },
    Failed(PageError),
}

impl PageOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Result of [`PageController::revalidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    /// The page still belongs to the current viewer.
    Unchanged,
    /// The viewer signed out or changed; the page has been destroyed.
    Ended,
}

/// Drives one page view through [`PageLifecycleState`].
pub struct PageController {
    id: Uuid,
    page: Arc<dyn DashboardPage>,
    services: PageServices,
    dependencies: Vec<Arc<dyn Dependency>>,
    state: PageLifecycleState,
    history: Vec<PageLifecycleState>,
    outcome: Option<PageOutcome>,
    identity: Option<UserIdentity>,
    payload: Option<DashboardPayload>,
    subscriptions: SubscriptionSet,
    destroyed: bool,
}

impl PageController {
    pub fn new(page: Arc<dyn DashboardPage>, services: PageServices) -> Self {
        let dependencies: Vec<Arc<dyn Dependency>> = vec![
            services.session.clone(),
            services.resolver.clone(),
            Arc::new(services.data.loader().clone()),
        ];
        Self {
            id: Uuid::now_v7(),
            page,
            services,
            dependencies,
            state: PageLifecycleState::Uninitialized,
            history: Vec::new(),
            outcome: None,
            identity: None,
            payload: None,
            subscriptions: SubscriptionSet::new(),
            destroyed: false,
        }
    }

    /// Add a collaborator the dependency wait must see ready.
    pub fn with_dependency(mut self, dependency: Arc<dyn Dependency>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PageLifecycleState {
        self.state
    }

    /// Every state entered, in order.
    pub fn history(&self) -> &[PageLifecycleState] {
        &self.history
    }

    pub fn outcome(&self) -> Option<&PageOutcome> {
        self.outcome.as_ref()
    }

    pub fn payload(&self) -> Option<&DashboardPayload> {
        self.payload.as_ref()
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Run the full lifecycle once.
    pub async fn initialize(&mut self) -> PageOutcome {
        if self.destroyed {
            return PageOutcome::Failed(PageError::Destroyed);
        }
        if self.state != PageLifecycleState::Uninitialized {
            warn!(page = %self.page.name(), state = %self.state, "page already initialized");
            return self
                .outcome
                .clone()
                .unwrap_or(PageOutcome::Failed(PageError::NotReady { state: self.state }));
        }

        info!(page = %self.page.name(), page_id = %self.id, "page initializing");
        let outcome = self.run().await;
        self.outcome = Some(outcome.clone());
        outcome
    }

    async fn run(&mut self) -> PageOutcome {
        self.transition(PageLifecycleState::WaitingForDependencies);
        self.services.surface.show_loading(self.page.name());
        if let Err(err) =
            wait_for_dependencies(&self.dependencies, self.services.dependency_wait).await
        {
            return self.fail(err);
        }

        self.transition(PageLifecycleState::CheckingAuth);
        let Some(identity) = self.services.session.identity() else {
            info!(page = %self.page.name(), "no session, showing login prompt");
            self.services.surface.show_login_prompt(self.page.name());
            return PageOutcome::LoginRequired;
        };

        self.transition(PageLifecycleState::CheckingPermissions);
        if let Some(required) = self.page.required_role() {
            let role = self.services.resolver.role().unwrap_or(identity.role);
            if role != required {
                let target = role.home_path().to_string();
                info!(
                    page = %self.page.name(),
                    required = %required,
                    role = %role,
                    to = %target,
                    "role mismatch, redirecting to role home"
                );
                self.services.navigator.redirect(&target);
                return PageOutcome::Redirected { target };
            }
        }
        self.identity = Some(identity);

        match self.load_and_render(false).await {
            Ok(report) => {
                if let Some(identity) = self.identity.as_ref() {
                    self.page
                        .on_ready(&self.services, identity, &mut self.subscriptions);
                }
                info!(
                    page = %self.page.name(),
                    subscriptions = self.subscriptions.len(),
                    failed_sections = report.failed_sections.len(),
                    "page ready"
                );
                PageOutcome::Ready(report)
            }
            Err(err) => self.fail(err),
        }
    }

    /// Reload the payload and render again. Only valid from Ready.
    pub async fn refresh(&mut self) -> Result<RenderReport, PageError> {
        if self.destroyed {
            return Err(PageError::Destroyed);
        }
        if self.state != PageLifecycleState::Ready {
            return Err(PageError::NotReady { state: self.state });
        }

        debug!(page = %self.page.name(), "page refresh");
        match self.load_and_render(true).await {
            Ok(report) => {
                self.outcome = Some(PageOutcome::Ready(report.clone()));
                Ok(report)
            }
            Err(err) => {
                let outcome = self.fail(err.clone());
                self.outcome = Some(outcome);
                Err(err)
            }
        }
    }

    /// Compare the rendered viewer with the current session.
    ///
    /// A page rendered for an identity that has since signed out or changed
    /// drops every cached dashboard read and is destroyed. Call after each
    /// session change, e.g. from [`crate::RouteGuard::watch`].
    pub fn revalidate(&mut self) -> SessionCheck {
        if self.destroyed {
            return SessionCheck::Ended;
        }
        let Some(rendered) = self.identity.as_ref() else {
            return SessionCheck::Unchanged;
        };
        let current = self.services.session.identity();
        if current.as_ref() == Some(rendered) {
            return SessionCheck::Unchanged;
        }

        let cleared = self.services.data.loader().clear();
        info!(
            page = %self.page.name(),
            user_id = %rendered.id,
            signed_out = current.is_none(),
            cleared,
            "viewer changed, closing page"
        );
        if current.is_none() {
            self.services.surface.show_login_prompt(self.page.name());
        }
        self.identity = None;
        self.payload = None;
        self.destroy();
        SessionCheck::Ended
    }

    /// Release every subscription. The controller cannot be used afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        let released = self.subscriptions.release_all();
        self.destroyed = true;
        info!(page = %self.page.name(), page_id = %self.id, released, "page destroyed");
    }

    async fn load_and_render(&mut self, force_refresh: bool) -> Result<RenderReport, PageError> {
        let identity = self
            .identity
            .clone()
            .ok_or(PageError::NotReady { state: self.state })?;

        self.transition(PageLifecycleState::LoadingData);
        let payload = self.services.data.dashboard(&identity.id, force_refresh).await?;

        self.transition(PageLifecycleState::Rendering);
        let report = render(self.page.as_ref(), &self.services, &identity, &payload, force_refresh)
            .await;
        self.payload = Some(payload);

        self.transition(PageLifecycleState::Ready);
        Ok(report)
    }

    fn fail(&mut self, err: PageError) -> PageOutcome {
        error!(page = %self.page.name(), state = %self.state, error = %err, "page failed");
        self.transition(PageLifecycleState::Failed);
        self.services.surface.show_error(self.page.name(), &err);
        PageOutcome::Failed(err)
    }

    fn transition(&mut self, next: PageLifecycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal page transition {} -> {}",
            self.state,
            next
        );
        debug!(page = %self.page.name(), from = %self.state, to = %next, "page state");
        self.state = next;
        self.history.push(next);
    }
}

/// Profile, then stats, then the page body. Each part fails on its own.
async fn render(
    page: &dyn DashboardPage,
    services: &PageServices,
    identity: &UserIdentity,
    payload: &DashboardPayload,
    force_refresh: bool,
) -> RenderReport {
    let ctx = PageContext::new(identity, payload, services, force_refresh);

    if let Err(err) = services.surface.render_profile(&payload.profile) {
        ctx.contain("profile", &err);
    }
    if let Err(err) = services.surface.render_stats(&payload.stats) {
        ctx.contain("stats", &err);
    }
    if let Err(err) = page.render_dashboard_content(&ctx).await {
        ctx.contain("content", &err);
    }

    ctx.into_report()
}

impl std::fmt::Debug for PageController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageController")
            .field("id", &self.id)
            .field("page", &self.page.name())
            .field("state", &self.state)
            .field("subscriptions", &self.subscriptions.len())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
