//! Authenticated principals and their roles

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Roles a user can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular community member
    User,
    /// Reviews corrections
    Moderator,
    /// Manages users and schema options
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Moderator, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// The authenticated caller of an operation.
///
/// Core operations never read ambient session state; the principal is
/// always passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub username: String,
    pub roles: BTreeSet<Role>,
}

impl Principal {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Highest role held, `None` for a principal without roles
    pub fn highest_role(&self) -> Option<Role> {
        self.roles.iter().next_back().copied()
    }

    /// Moderators and admins may review corrections
    pub fn can_moderate(&self) -> bool {
        self.has_role(Role::Moderator) || self.has_role(Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.username, self.user_id)
    }
}
