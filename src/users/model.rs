//! User account documents

use bson::{doc, Document as BsonDocument};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::sanitize::normalize_username;
use crate::auth::Role;
use crate::db::{IntoIndexes, Metadata};

/// Community rank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    #[default]
    Recruit,
    Scout,
    Veteran,
    Elite,
    Legend,
}

impl Rank {
    pub const ALL: [Rank; 5] = [Rank::Recruit, Rank::Scout, Rank::Veteran, Rank::Elite, Rank::Legend];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Recruit => "recruit",
            Rank::Scout => "scout",
            Rank::Veteran => "veteran",
            Rank::Elite => "elite",
            Rank::Legend => "legend",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Rank::ALL
            .into_iter()
            .find(|r| r.as_str() == lowered)
            .ok_or_else(|| format!("'{s}' is not a valid rank"))
    }
}

/// User document as stored
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserDoc {
    /// UUID v4
    pub id: String,
    /// Stored lowercased
    pub username: String,
    /// Stored lowercased
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub rank: Rank,
    #[serde(default = "default_roles")]
    pub roles: BTreeSet<Role>,
    #[serde(default)]
    pub banned: bool,
    /// Only meaningful while `banned`
    #[serde(default)]
    pub ban_reason: Option<String>,
    /// Optimistic-concurrency stamp
    #[serde(default = "default_version")]
    pub version: i64,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_roles() -> BTreeSet<Role> {
    BTreeSet::from([Role::User])
}

fn default_version() -> i64 {
    1
}

impl UserDoc {
    pub fn new(username: &str, email: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: normalize_username(username),
            email: email.trim().to_ascii_lowercase(),
            display_name: None,
            bio: None,
            rank: Rank::default(),
            roles: default_roles(),
            banned: false,
            ban_reason: None,
            version: 1,
            metadata: Metadata::new(),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(BsonDocument, Option<IndexOptions>)> {
        vec![
            // Unique index on username
            (
                doc! { "username": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("username_unique".to_string())
                        .build(),
                ),
            ),
            // Unique index on email
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            // Role filter in the admin list
            (
                doc! { "roles": 1 },
                Some(
                    IndexOptions::builder()
                        .name("roles_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

/// Profile shown to the public, without contact or moderation details
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub rank: Rank,
    pub roles: BTreeSet<Role>,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl From<&UserDoc> for PublicProfile {
    fn from(user: &UserDoc) -> Self {
        Self {
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            bio: user.bio.clone(),
            rank: user.rank,
            roles: user.roles.clone(),
            joined_at: user.metadata.created_at,
        }
    }
}

// =============================================================================
// Patch<T> - Three-way field update
// =============================================================================

/// Three-way patch for one field of an update.
///
/// - `Keep` - field absent from the request, leave it alone
/// - `Clear` - field sent as `null`, remove the value
/// - `Set(T)` - field sent with a value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// Apply the patch to a current value
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Keep => current,
            Patch::Clear => None,
            Patch::Set(v) => Some(v),
        }
    }
}

// absent = Keep (via #[serde(default)]), null = Clear, value = Set
impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Patch::Keep | Patch::Clear => serializer.serialize_none(),
            Patch::Set(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let opt: Option<T> = Option::deserialize(deserializer)?;
        match opt {
            None => Ok(Patch::Clear),
            Some(v) => Ok(Patch::Set(v)),
        }
    }
}

/// Partial update of a user record, as sent by the admin edit form.
///
/// Values arrive loosely typed (`rank` and `roles` as strings) and are
/// checked by the update engine so every bad field gets its own message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub username: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub email: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep", alias = "display_name")]
    pub display_name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub bio: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub rank: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub roles: Patch<Vec<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub banned: Patch<bool>,
    #[serde(default, skip_serializing_if = "Patch::is_keep", alias = "ban_reason")]
    pub ban_reason: Patch<String>,
}

impl UserUpdate {
    /// True when no field was sent at all
    pub fn is_empty(&self) -> bool {
        self.username.is_keep()
            && self.email.is_keep()
            && self.display_name.is_keep()
            && self.bio.is_keep()
            && self.rank.is_keep()
            && self.roles.is_keep()
            && self.banned.is_keep()
            && self.ban_reason.is_keep()
    }
}
