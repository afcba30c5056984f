//! Cohort dashboard client.
//!
//! Ties the session layer and the coalescing cache together into the page
//! pipeline every dashboard view runs through:
//!
//! 1. [`RouteGuard`] waits for the session and enforces the route's
//!    [`cohort_core::RouteRequirement`].
//! 2. [`ContextResolver`] turns the session into role-scoped behavior.
//! 3. [`PageController`] waits for its dependencies, checks auth and role,
//!    loads through [`DashboardData`] and renders with per-section
//!    containment.
//!
//! [`RestClient`] and [`spawn_ws_feed`] are the network edges.

pub mod api_client;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod page;
pub mod pages;
pub mod realtime;
pub mod service;
pub mod subscriptions;
pub mod telemetry;
pub mod types;

pub use api_client::RestClient;
pub use config::{ConfigError, DashboardConfig, ReconnectConfig};
pub use context::{ContextResolver, ResolverState};
pub use error::{DashboardError, DashboardResult};
pub use guard::{GuardDecision, GuardWatch, Navigator, RedirectMarker, RouteGuard};
pub use page::{
    wait_for_dependencies, DashboardPage, Dependency, PageContext, PageController, PageOutcome,
    PageServices, RenderReport, SessionCheck, Surface, TerminalSurface,
};
pub use pages::{home_area, Route, RouteTable, RoleOverviewPage, Visit};
pub use realtime::{spawn_ws_feed, RealtimeEvent, RealtimeHub, WsFeed};
pub use service::{DashboardData, DashboardService, RefreshSummary};
pub use subscriptions::{Subscription, SubscriptionSet};
pub use telemetry::{init_tracing, LogFormat};
pub use types::*;
