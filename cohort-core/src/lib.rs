//! Cohort Core - Orchestration Types
//!
//! Identity, session, route and lifecycle types shared by every other crate
//! in the workspace, plus the role access table and the error taxonomy.
//! No I/O lives here.

pub mod access;
pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod route;
pub mod session;

pub use access::{accessible_areas, can_access_page, DataLoadingStrategy, PageArea};
pub use config::{OrchestrationConfig, RetryPolicy, DEFAULT_CACHE_TTL_MS, MAX_WAIT_CEILING};
pub use error::{
    CohortError, CohortResult, ConfigError, IdentityError, LoadError, PageError, RenderError,
    SessionError,
};
pub use identity::{CommunityId, Role, UserId, UserIdentity};
pub use lifecycle::PageLifecycleState;
pub use route::RouteRequirement;
pub use session::Session;
