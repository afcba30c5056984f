//! Session layer for the Cohort dashboard client.
//!
//! [`SessionStore`] resolves who the user is at startup (fetch, one
//! credential refresh, one refetch), publishes the result exactly once
//! through a readiness signal, and afterwards serves the identity
//! synchronously to every page.

pub mod backend;
pub mod credentials;
pub mod readiness;
pub mod store;

pub use backend::{IdentityOutcome, SessionBackend};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredCredentials};
pub use readiness::ReadySignal;
pub use store::SessionStore;
