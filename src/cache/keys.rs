//! Page cache keys
//!
//! Every cached page is addressed by a [`PageKey`]. Storage keys are
//! colon-separated so related pages can be invalidated by prefix.

use std::fmt;

use crate::schema::EntityKind;

/// A cacheable rendered page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageKey {
    /// Canonical record page
    Entity { kind: EntityKind, id: String },
    /// Paginated list of canonical records
    EntityList { kind: EntityKind, page: u32, limit: u32 },
    /// Public profile page, addressed by username
    UserProfile { username: String },
    /// Admin user list (any filter combination)
    AdminUserList { query_hash: String },
    /// Admin user edit page
    AdminUserEdit { user_id: String },
}

impl PageKey {
    pub fn entity(kind: EntityKind, id: &str) -> Self {
        PageKey::Entity {
            kind,
            id: id.to_string(),
        }
    }

    pub fn user_profile(username: &str) -> Self {
        PageKey::UserProfile {
            username: username.to_string(),
        }
    }

    /// Admin list key; the query string is hashed for a shorter key
    pub fn admin_user_list(query: &str) -> Self {
        let query_hash = if query.is_empty() {
            "empty".to_string()
        } else {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(query.as_bytes());
            let hash = hasher.finalize();
            hex::encode(&hash[..8])
        };
        PageKey::AdminUserList { query_hash }
    }

    pub fn admin_user_edit(user_id: &str) -> Self {
        PageKey::AdminUserEdit {
            user_id: user_id.to_string(),
        }
    }

    /// Convert to storage key string
    pub fn to_storage_key(&self) -> String {
        match self {
            PageKey::Entity { kind, id } => format!("entity:{}:{}", kind, id),
            PageKey::EntityList { kind, page, limit } => {
                format!("entities:{}:{}:{}", kind, page, limit)
            }
            PageKey::UserProfile { username } => format!("profile:{}", username),
            PageKey::AdminUserList { query_hash } => format!("admin:users:list:{}", query_hash),
            PageKey::AdminUserEdit { user_id } => format!("admin:users:edit:{}", user_id),
        }
    }

    /// Pattern matching every list page of an entity kind
    pub fn entity_list_pattern(kind: EntityKind) -> String {
        format!("entities:{}:", kind)
    }

    /// Pattern matching every admin user list page
    pub fn admin_user_list_pattern() -> &'static str {
        "admin:users:list:"
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage_key())
    }
}
