//! Per-page route requirements.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::identity::{Role, UserIdentity};

/// Authentication and role precondition declared by a page.
///
/// `roles == None` means any authenticated (or anonymous, when
/// `requires_auth` is false) viewer passes the role check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequirement {
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub roles: Option<BTreeSet<Role>>,
}

impl RouteRequirement {
    /// No authentication, no role restriction.
    pub fn public() -> Self {
        Self::default()
    }

    /// Any logged-in user.
    pub fn authenticated() -> Self {
        Self {
            requires_auth: true,
            roles: None,
        }
    }

    /// Logged-in user holding one of `roles`.
    pub fn with_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            requires_auth: true,
            roles: Some(roles.into_iter().collect()),
        }
    }

    /// Whether the role set (if any) admits the given identity.
    ///
    /// An absent identity never satisfies a role restriction.
    pub fn admits_role(&self, identity: Option<&UserIdentity>) -> bool {
        match &self.roles {
            None => true,
            Some(roles) => identity.is_some_and(|identity| roles.contains(&identity.role)),
        }
    }

    /// Whether the requirement is fully satisfied by `identity`.
    pub fn is_satisfied_by(&self, identity: Option<&UserIdentity>) -> bool {
        if self.requires_auth && identity.is_none() {
            return false;
        }
        self.admits_role(identity)
    }
}
