//! Error types for the dashboard client.

use crate::config::ConfigError;
use cohort_core::{CohortError, LoadError, PageError, SessionError};

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Telemetry error: {0}")]
    Telemetry(String),
    #[error(transparent)]
    Core(#[from] CohortError),
    #[error("No page is registered for {path}")]
    UnknownRoute { path: String },
}

impl From<LoadError> for DashboardError {
    fn from(err: LoadError) -> Self {
        Self::Core(err.into())
    }
}

impl From<SessionError> for DashboardError {
    fn from(err: SessionError) -> Self {
        Self::Core(err.into())
    }
}

impl From<PageError> for DashboardError {
    fn from(err: PageError) -> Self {
        Self::Core(err.into())
    }
}

pub type DashboardResult<T> = Result<T, DashboardError>;
