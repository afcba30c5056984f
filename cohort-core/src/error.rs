//! Error types for Cohort orchestration

use thiserror::Error;

use crate::lifecycle::PageLifecycleState;

/// Identity parsing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Unknown role: {value}")]
    UnknownRole { value: String },
}

/// Failure of a backend read. Cloned to every coalesced waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode response: {reason}")]
    Decode { reason: String },

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Cached value for {key} has a different type than requested")]
    TypeMismatch { key: String },
}

impl LoadError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Whether the failure means the stored credentials are no longer accepted.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Unauthenticated => true,
            Self::Status { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

/// Session store errors. Never surfaced to pages directly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Credential storage failed: {reason}")]
    CredentialStorage { reason: String },

    #[error("Credential refresh rejected: {reason}")]
    RefreshRejected { reason: String },

    #[error("Session has not been bootstrapped yet")]
    NotBootstrapped,

    #[error("Session backend error: {0}")]
    Backend(#[from] LoadError),
}

/// Errors a page controller translates into user-visible states.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("Dependencies unavailable after {attempts} attempts: {missing:?}")]
    DependenciesUnavailable { attempts: u32, missing: Vec<String> },

    #[error("Dashboard data failed to load: {0}")]
    Load(#[from] LoadError),

    #[error("Page is {state}, refresh requires ready")]
    NotReady { state: PageLifecycleState },

    #[error("Page has been destroyed")]
    Destroyed,
}

/// Failure of a single rendered section.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Section {section} failed: {reason}")]
    Section { section: String, reason: String },

    #[error("Section {section} data unavailable: {source}")]
    Data {
        section: String,
        #[source]
        source: LoadError,
    },
}

impl RenderError {
    pub fn section(section: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Section {
            section: section.into(),
            reason: reason.into(),
        }
    }

    pub fn data(section: impl Into<String>, source: LoadError) -> Self {
        Self::Data {
            section: section.into(),
            source,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all Cohort errors.
#[derive(Debug, Clone, Error)]
pub enum CohortError {
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Cohort operations.
pub type CohortResult<T> = Result<T, CohortError>;

// =============================================================================
// TESTS
// =============================================================================
