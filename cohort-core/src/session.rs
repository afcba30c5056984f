//! Session snapshot shared with every consumer of the session store.

use serde::{Deserialize, Serialize};

use crate::identity::{CommunityId, Role, UserIdentity};

/// Who is logged in, and whether that has been determined yet.
///
/// Only the session store writes this value; everything else reads a clone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    identity: Option<UserIdentity>,
    ready: bool,
}

impl Session {
    /// The state at process start: no identity, not ready.
    pub fn pending() -> Self {
        Self::default()
    }

    /// A settled session, with or without an identity.
    pub fn resolved(identity: Option<UserIdentity>) -> Self {
        Self {
            identity,
            ready: true,
        }
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn into_identity(self) -> Option<UserIdentity> {
        self.identity
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|identity| identity.role)
    }

    pub fn community_id(&self) -> Option<&CommunityId> {
        self.identity
            .as_ref()
            .and_then(|identity| identity.community_id.as_ref())
    }
}
