//! Built-in role overview pages and the route table that serves them.

use crate::guard::{GuardDecision, RouteGuard};
use crate::page::{DashboardPage, PageContext, PageController, PageOutcome, PageServices};
use crate::realtime::RealtimeEvent;
use crate::subscriptions::SubscriptionSet;
use crate::types::{CommunityContext, MemberSummary};
use async_trait::async_trait;
use cohort_core::{accessible_areas, PageArea, RenderError, Role, RouteRequirement, UserIdentity};
use std::sync::Arc;
use tracing::debug;

/// Area a role lands in.
pub fn home_area(role: Role) -> PageArea {
    match role {
        Role::Admin => PageArea::Admin,
        Role::Mentor => PageArea::Mentor,
        Role::Student => PageArea::Student,
        Role::PersonalUser => PageArea::Personal,
    }
}

/// Overview dashboard for one role. Sections follow the viewer's
/// [`cohort_core::DataLoadingStrategy`].
#[derive(Debug, Clone)]
pub struct RoleOverviewPage {
    role: Role,
    name: String,
}

impl RoleOverviewPage {
    pub fn new(role: Role) -> Self {
        let area = home_area(role).prefix().trim_start_matches('/');
        Self {
            role,
            name: format!("{}-overview", area),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

#[async_trait]
impl DashboardPage for RoleOverviewPage {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_role(&self) -> Option<Role> {
        Some(self.role)
    }

    async fn render_dashboard_content(&self, ctx: &PageContext<'_>) -> Result<(), RenderError> {
        let strategy = ctx.strategy();
        let force = ctx.force_refresh();
        let community = ctx.resolver().community_id();
        let community = community.as_ref();

        if strategy.load_community {
            ctx.section("community", || async move {
                let context = ctx
                    .resolver()
                    .load_community_context(force)
                    .await
                    .map_err(|err| RenderError::data("community", err))?;
                Ok(community_lines(&context))
            })
            .await;
        }
        if strategy.load_users {
            ctx.section("users", || async move {
                let users = ctx
                    .data()
                    .users(force)
                    .await
                    .map_err(|err| RenderError::data("users", err))?;
                Ok(member_lines(&users))
            })
            .await;
        }
        if strategy.load_mentors {
            ctx.section("mentors", || async move {
                let mentors = ctx
                    .data()
                    .mentors(community, force)
                    .await
                    .map_err(|err| RenderError::data("mentors", err))?;
                Ok(member_lines(&mentors))
            })
            .await;
        }
        if strategy.load_students {
            ctx.section("students", || async move {
                let students = ctx
                    .data()
                    .students(community, force)
                    .await
                    .map_err(|err| RenderError::data("students", err))?;
                Ok(member_lines(&students))
            })
            .await;
        }
        if strategy.load_analytics {
            if let Some(community) = community {
                ctx.section("analytics", || async move {
                    let snapshot = ctx
                        .data()
                        .analytics(community, force)
                        .await
                        .map_err(|err| RenderError::data("analytics", err))?;
                    Ok(snapshot
                        .metrics
                        .iter()
                        .map(|(metric, value)| format!("{}: {:.2}", metric, value))
                        .collect())
                })
                .await;
            }
        }
        if strategy.load_personal {
            ctx.section("personal", || async move {
                let overview = ctx
                    .data()
                    .personal_overview(&ctx.identity().id, force)
                    .await
                    .map_err(|err| RenderError::data("personal", err))?;
                let mut lines = vec![format!("completed sessions: {}", overview.completed_sessions)];
                lines.extend(overview.goals.iter().map(|goal| format!("goal: {}", goal)));
                Ok(lines)
            })
            .await;
        }
        Ok(())
    }

    /// Drop cached community data whenever the feed reports a change to the
    /// viewer's community.
    fn on_ready(
        &self,
        services: &PageServices,
        identity: &UserIdentity,
        subscriptions: &mut SubscriptionSet,
    ) {
        let Some(community) = identity.community_id.clone() else {
            return;
        };
        let data = services.data.clone();
        let subscription = services
            .realtime
            .subscribe(format!("{}:community", self.name), move |event| {
                if event.community_id() != Some(&community) {
                    return;
                }
                let dropped = data.invalidate_community(&community);
                let members = if matches!(event, RealtimeEvent::MemberJoined { .. }) {
                    data.invalidate_members()
                } else {
                    0
                };
                debug!(
                    event_type = event.event_type(),
                    community = %community,
                    dropped,
                    members,
                    "community data invalidated"
                );
            });
        subscriptions.push(subscription);
    }
}

fn community_lines(context: &CommunityContext) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(summary) = &context.summary {
        lines.push(format!(
            "{}: {} members ({} mentors, {} students)",
            summary.name, summary.member_count, summary.mentor_count, summary.student_count
        ));
    }
    if let Some(insights) = &context.insights {
        lines.push(format!(
            "{} active pairings, {} sessions this week, engagement {:.2}",
            insights.active_pairings, insights.sessions_this_week, insights.engagement_score
        ));
    }
    if lines.is_empty() {
        lines.push("not part of a community yet".to_string());
    }
    lines
}

fn member_lines(members: &[MemberSummary]) -> Vec<String> {
    members
        .iter()
        .map(|member| format!("{} ({})", member.display_name, member.role))
        .collect()
}

/// One area of the dashboard and who may open it.
#[derive(Clone)]
pub struct Route {
    pub area: PageArea,
    pub requirement: RouteRequirement,
    pub page: Arc<dyn DashboardPage>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("area", &self.area)
            .field("requirement", &self.requirement)
            .field("page", &self.page.name())
            .finish()
    }
}

/// Result of [`RouteTable::open`].
#[derive(Debug)]
pub enum Visit {
    /// The guard stopped the navigation before any page logic ran.
    Denied(GuardDecision),
    Opened {
        controller: PageController,
        outcome: PageOutcome,
    },
}

/// Path prefix to page mapping.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// One overview page per area. An area admits every role whose
    /// accessible areas include it.
    pub fn standard() -> Self {
        let mut table = Self::new();
        for role in Role::all() {
            let area = home_area(*role);
            let admitted = Role::all()
                .iter()
                .copied()
                .filter(|candidate| accessible_areas(*candidate).contains(&area));
            table.insert(Route {
                area,
                requirement: RouteRequirement::with_roles(admitted),
                page: Arc::new(RoleOverviewPage::new(*role)),
            });
        }
        table
    }

    /// Add a route, replacing any existing route for the same area.
    pub fn insert(&mut self, route: Route) {
        self.routes.retain(|existing| existing.area != route.area);
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn resolve(&self, path: &str) -> Option<&Route> {
        let area = PageArea::of_path(path)?;
        self.routes.iter().find(|route| route.area == area)
    }

    /// Guard `path`, then run its page lifecycle. `None` for unknown paths.
    pub async fn open(
        &self,
        path: &str,
        guard: &RouteGuard,
        services: &PageServices,
    ) -> Option<Visit> {
        let route = self.resolve(path)?;
        let decision = guard.check(&route.requirement).await;
        if !decision.is_allowed() {
            return Some(Visit::Denied(decision));
        }
        let mut controller = PageController::new(route.page.clone(), services.clone());
        let outcome = controller.initialize().await;
        Some(Visit::Opened {
            controller,
            outcome,
        })
    }
}
