//! Shared page lifecycle and its seams.

pub mod controller;
pub mod dependency;
pub mod surface;

pub use controller::{
    DashboardPage, PageContext, PageController, PageOutcome, PageServices, RenderReport,
    SessionCheck,
};
pub use dependency::{wait_for_dependencies, Dependency};
pub use surface::{Surface, TerminalSurface};
