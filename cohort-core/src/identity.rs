//! Identity types for authenticated dashboard users

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IdentityError;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Opaque user identifier issued by the backend.
    UserId
);

opaque_id!(
    /// Opaque community identifier. Users outside a community carry none.
    CommunityId
);

/// Platform role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Mentor,
    Student,
    #[serde(alias = "personal-user", alias = "personal")]
    PersonalUser,
}

impl Role {
    pub fn all() -> &'static [Role] {
        &[Role::Admin, Role::Mentor, Role::Student, Role::PersonalUser]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Mentor => "mentor",
            Role::Student => "student",
            Role::PersonalUser => "personal_user",
        }
    }

    /// Landing dashboard for the role; target of role-based redirects.
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Mentor => "/mentor/dashboard",
            Role::Student => "/student/dashboard",
            Role::PersonalUser => "/personal/dashboard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "mentor" => Ok(Role::Mentor),
            "student" => Ok(Role::Student),
            "personal_user" | "personal-user" | "personal" => Ok(Role::PersonalUser),
            other => Err(IdentityError::UnknownRole {
                value: other.to_string(),
            }),
        }
    }
}

/// The authenticated user as reported by the session endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub role: Role,
    #[serde(default, rename = "communityId", alias = "community_id")]
    pub community_id: Option<CommunityId>,
    #[serde(default, rename = "displayName", alias = "display_name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            community_id: None,
            display_name: None,
            email: None,
        }
    }

    pub fn with_community(mut self, community_id: impl Into<CommunityId>) -> Self {
        self.community_id = Some(community_id.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Name shown in profile headers, falling back to the email and then the id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or_else(|| self.id.as_str())
    }
}
