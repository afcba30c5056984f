//! Session endpoint seam.

use async_trait::async_trait;
use cohort_core::{LoadError, UserIdentity};

/// Answer of the "who am I" endpoint when the transport succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    Authenticated(UserIdentity),
    /// Credentials missing, expired or rejected.
    Unauthenticated,
}

impl IdentityOutcome {
    pub fn into_identity(self) -> Option<UserIdentity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Unauthenticated => None,
        }
    }
}

/// The two session calls the store consumes, using ambient stored credentials.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Fetch the current identity. Idempotent.
    async fn current_identity(&self) -> Result<IdentityOutcome, LoadError>;

    /// Exchange the refresh credential for a new access credential.
    async fn refresh_credentials(&self) -> Result<(), LoadError>;

    /// Tell the backend the session ended. Local state is cleared regardless.
    async fn sign_out(&self) -> Result<(), LoadError> {
        Ok(())
    }
}
