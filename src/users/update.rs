//! Admin user management
//!
//! The admin update engine applies partial edits to user records:
//!
//! 1. the target id must be a UUID and the actor an admin
//! 2. every field is shape-checked and free text sanitised
//! 3. an admin may never change their own roles
//! 4. the ban reason only exists while the user is banned
//! 5. username and email stay unique (checked first, unique index as backstop)
//! 6. the write is guarded on the record version
//! 7. cached profile, list and edit pages are invalidated

use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::model::{Patch, PublicProfile, Rank, UserDoc, UserUpdate};
use super::sanitize::{is_valid_email, is_valid_username, normalize_username, sanitize_text};
use crate::auth::{ensure_allowed, Operation, Principal, Role};
use crate::cache::{PageCache, PageKey};
use crate::db::{
    from_document, to_document, Document, DocumentStore, Filter, FindOptions, ID_FIELD, USER_COLLECTION,
};
use crate::types::{CodexError, FieldIssue, Result, ValidationErrors};

pub const MAX_DISPLAY_NAME_LEN: usize = 64;
pub const MAX_BIO_LEN: usize = 500;
pub const MAX_BAN_REASON_LEN: usize = 500;

const USERNAME_TAKEN: &str = "Username already in use";
const EMAIL_TAKEN: &str = "Email already in use";

/// Filters for the admin user list
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub search: Option<String>,
    pub role: Option<Role>,
    pub banned: Option<bool>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<UserDoc>,
    pub total: u64,
}

/// A shape-checked update. `None` / `Keep` means leave the field alone.
#[derive(Debug, Default)]
struct CheckedUpdate {
    username: Option<String>,
    email: Option<String>,
    display_name: Patch<String>,
    bio: Patch<String>,
    rank: Option<Rank>,
    roles: Option<BTreeSet<Role>>,
    banned: Option<bool>,
    ban_reason: Patch<String>,
}

pub struct AdminUserService {
    db: Arc<dyn DocumentStore>,
    cache: Arc<PageCache>,
}

impl AdminUserService {
    pub fn new(db: Arc<dyn DocumentStore>, cache: Arc<PageCache>) -> Self {
        Self { db, cache }
    }

    /// Create an account (seeding and tests)
    pub async fn create_user(&self, mut user: UserDoc) -> Result<UserDoc> {
        user.username = normalize_username(&user.username);
        user.email = user.email.trim().to_ascii_lowercase();

        let mut issues = ValidationErrors::new();
        if !is_valid_username(&user.username) {
            issues.push(FieldIssue::field(
                "username",
                "must be 3-32 letters, digits, '_' or '-'",
            ));
        }
        if !is_valid_email(&user.email) {
            issues.push(FieldIssue::field("email", "must be a valid email address"));
        }
        issues.into_result()?;

        self.ensure_unique("username", &user.username, &user.id, USERNAME_TAKEN)
            .await?;
        self.ensure_unique("email", &user.email, &user.id, EMAIL_TAKEN)
            .await?;

        self.db
            .insert(USER_COLLECTION, to_document(&user)?)
            .await
            .map_err(uniqueness_conflict)?;

        self.cache
            .invalidate_prefix(PageKey::admin_user_list_pattern());
        info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, actor: &Principal, user_id: &str) -> Result<UserDoc> {
        ensure_allowed(Operation::ViewUsers, actor)?;
        parse_user_id(user_id)?;
        self.load(user_id).await
    }

    pub async fn list_users(&self, actor: &Principal, query: &UserQuery) -> Result<UserPage> {
        ensure_allowed(Operation::ViewUsers, actor)?;

        let mut filter = Filter::new();
        if let Some(ref search) = query.search {
            let search = search.trim();
            if !search.is_empty() {
                filter = filter.search(&["username", "email", "display_name"], search);
            }
        }
        if let Some(role) = query.role {
            filter = filter.eq("roles", role.as_str());
        }
        if let Some(banned) = query.banned {
            filter = filter.eq("banned", banned);
        }

        let options = FindOptions::page(query.page, query.limit).sorted_by("metadata.created_at", true);
        let docs = self.db.find(USER_COLLECTION, &filter, &options).await?;
        let total = self.db.count(USER_COLLECTION, &filter).await?;
        let users = docs
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<UserDoc>>>()?;

        Ok(UserPage { users, total })
    }

    /// Public profile by username
    pub async fn get_profile(&self, username: &str) -> Result<PublicProfile> {
        let docs = self
            .db
            .find_by_field(USER_COLLECTION, "username", &Value::from(normalize_username(username)))
            .await?;
        let doc = docs
            .into_iter()
            .next()
            .ok_or_else(|| CodexError::NotFound("User not found".into()))?;
        let user: UserDoc = from_document(doc)?;
        Ok(PublicProfile::from(&user))
    }

    /// Apply an admin edit to a user record and return the updated record
    pub async fn update_user(&self, actor: &Principal, user_id: &str, update: UserUpdate) -> Result<UserDoc> {
        match self.apply_update(actor, user_id, update).await {
            Ok(user) => Ok(user),
            Err(e) if e.is_domain() => {
                warn!(actor = %actor.username, user_id, code = e.code(), error = %e, "User update rejected");
                Err(e)
            }
            Err(e) => {
                error!(actor = %actor.username, user_id, error = %e, "User update failed");
                Err(e)
            }
        }
    }

    async fn apply_update(&self, actor: &Principal, user_id: &str, update: UserUpdate) -> Result<UserDoc> {
        parse_user_id(user_id)?;
        ensure_allowed(Operation::UpdateUser, actor)?;

        let checked = check_update(update)?;
        let current = self.load(user_id).await?;

        if checked.roles.is_some() && actor.user_id == current.id {
            return Err(CodexError::Authorization(format!(
                "{} attempted to change their own roles",
                actor
            )));
        }

        let mut set = Document::new();
        let username = checked.username.filter(|u| *u != current.username);
        let email = checked.email.filter(|e| *e != current.email);

        if let Some(ref username) = username {
            set.insert("username".into(), Value::from(username.as_str()));
        }
        if let Some(ref email) = email {
            set.insert("email".into(), Value::from(email.as_str()));
        }
        patch_text(&mut set, "display_name", checked.display_name, &current.display_name);
        patch_text(&mut set, "bio", checked.bio, &current.bio);
        if let Some(rank) = checked.rank.filter(|r| *r != current.rank) {
            set.insert("rank".into(), serde_json::to_value(rank)?);
        }
        if let Some(roles) = checked.roles.filter(|r| *r != current.roles) {
            set.insert("roles".into(), serde_json::to_value(roles)?);
        }

        let banned = checked.banned.unwrap_or(current.banned);
        if banned != current.banned {
            set.insert("banned".into(), Value::Bool(banned));
        }
        if banned {
            patch_text(&mut set, "ban_reason", checked.ban_reason, &current.ban_reason);
        } else {
            if let Patch::Set(_) = checked.ban_reason {
                return Err(CodexError::invalid(
                    "ban_reason",
                    "can only be set on a banned user",
                ));
            }
            if current.ban_reason.is_some() {
                set.insert("ban_reason".into(), Value::Null);
            }
        }

        if set.is_empty() {
            return Err(CodexError::Validation(
                FieldIssue::general("No changes detected").into(),
            ));
        }

        if let Some(ref username) = username {
            self.ensure_unique("username", username, &current.id, USERNAME_TAKEN)
                .await?;
        }
        if let Some(ref email) = email {
            self.ensure_unique("email", email, &current.id, EMAIL_TAKEN)
                .await?;
        }

        let fields: Vec<String> = set.keys().cloned().collect();
        set.insert("version".into(), Value::from(current.version + 1));
        set.insert("metadata".into(), serde_json::to_value(current.metadata.touched())?);

        let guard = Filter::new().eq("version", current.version);
        let written = self
            .db
            .update_if(USER_COLLECTION, &current.id, &guard, set)
            .await
            .map_err(uniqueness_conflict)?;
        if !written {
            return Err(CodexError::Conflict(
                "User was modified by someone else, please reload and try again".into(),
            ));
        }

        self.invalidate_pages(&current, username.as_deref());

        info!(
            actor = %actor.username,
            user_id = %current.id,
            fields = ?fields,
            "User updated"
        );
        self.load(&current.id).await
    }

    async fn load(&self, user_id: &str) -> Result<UserDoc> {
        let doc = self
            .db
            .get(USER_COLLECTION, user_id)
            .await?
            .ok_or_else(|| CodexError::NotFound("User not found".into()))?;
        from_document(doc)
    }

    async fn ensure_unique(&self, field: &str, value: &str, user_id: &str, message: &str) -> Result<()> {
        let filter = Filter::new().eq(field, value).ne(ID_FIELD, user_id);
        if self.db.count(USER_COLLECTION, &filter).await? > 0 {
            return Err(CodexError::Conflict(message.to_string()));
        }
        Ok(())
    }

    fn invalidate_pages(&self, user: &UserDoc, new_username: Option<&str>) {
        self.cache.invalidate(&PageKey::user_profile(&user.username));
        if let Some(username) = new_username {
            self.cache.invalidate(&PageKey::user_profile(username));
        }
        self.cache.invalidate(&PageKey::admin_user_edit(&user.id));
        self.cache
            .invalidate_prefix(PageKey::admin_user_list_pattern());
    }
}

fn parse_user_id(user_id: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(user_id).map_err(|_| CodexError::invalid("id", "is not a valid user id"))
}

/// Translate a unique-index violation into the user-facing message
fn uniqueness_conflict(e: CodexError) -> CodexError {
    match e {
        CodexError::Conflict(msg) if msg.contains("username") => CodexError::Conflict(USERNAME_TAKEN.into()),
        CodexError::Conflict(msg) if msg.contains("email") => CodexError::Conflict(EMAIL_TAKEN.into()),
        other => other,
    }
}

fn patch_text(set: &mut Document, field: &str, patch: Patch<String>, current: &Option<String>) {
    match patch {
        Patch::Keep => {}
        Patch::Clear => {
            if current.is_some() {
                set.insert(field.to_string(), Value::Null);
            }
        }
        Patch::Set(value) => {
            if current.as_deref() != Some(value.as_str()) {
                set.insert(field.to_string(), Value::from(value));
            }
        }
    }
}

fn check_update(update: UserUpdate) -> Result<CheckedUpdate> {
    let mut issues = ValidationErrors::new();
    let mut checked = CheckedUpdate::default();

    match update.username {
        Patch::Keep => {}
        Patch::Clear => issues.push(FieldIssue::field("username", "cannot be cleared")),
        Patch::Set(s) if s.trim().is_empty() => {}
        Patch::Set(s) => {
            let s = normalize_username(&s);
            if is_valid_username(&s) {
                checked.username = Some(s);
            } else {
                issues.push(FieldIssue::field(
                    "username",
                    "must be 3-32 letters, digits, '_' or '-'",
                ));
            }
        }
    }

    match update.email {
        Patch::Keep => {}
        Patch::Clear => issues.push(FieldIssue::field("email", "cannot be cleared")),
        Patch::Set(s) if s.trim().is_empty() => {}
        Patch::Set(s) => {
            let s = s.trim().to_ascii_lowercase();
            if is_valid_email(&s) {
                checked.email = Some(s);
            } else {
                issues.push(FieldIssue::field("email", "must be a valid email address"));
            }
        }
    }

    checked.display_name = check_text(update.display_name, "display_name", MAX_DISPLAY_NAME_LEN, &mut issues);
    checked.bio = check_text(update.bio, "bio", MAX_BIO_LEN, &mut issues);
    checked.ban_reason = check_text(update.ban_reason, "ban_reason", MAX_BAN_REASON_LEN, &mut issues);

    match update.rank {
        Patch::Keep => {}
        Patch::Clear => issues.push(FieldIssue::field("rank", "cannot be cleared")),
        Patch::Set(s) if s.trim().is_empty() => {}
        Patch::Set(s) => match s.parse::<Rank>() {
            Ok(rank) => checked.rank = Some(rank),
            Err(msg) => issues.push(FieldIssue::field("rank", msg)),
        },
    }

    match update.roles {
        Patch::Keep => {}
        Patch::Clear => issues.push(FieldIssue::field("roles", "cannot be cleared")),
        Patch::Set(names) => {
            let mut roles = BTreeSet::new();
            for name in &names {
                match name.parse::<Role>() {
                    Ok(role) => {
                        roles.insert(role);
                    }
                    Err(msg) => issues.push(FieldIssue::field("roles", msg)),
                }
            }
            if names.is_empty() {
                issues.push(FieldIssue::field("roles", "must include at least one role"));
            }
            checked.roles = Some(roles);
        }
    }

    match update.banned {
        Patch::Keep => {}
        Patch::Clear => issues.push(FieldIssue::field("banned", "cannot be cleared")),
        Patch::Set(b) => checked.banned = Some(b),
    }

    issues.into_result()?;
    Ok(checked)
}

/// Sanitise a free-text patch. Text that sanitises to nothing counts as not provided.
fn check_text(patch: Patch<String>, field: &str, max_len: usize, issues: &mut ValidationErrors) -> Patch<String> {
    match patch {
        Patch::Keep => Patch::Keep,
        Patch::Clear => Patch::Clear,
        Patch::Set(raw) => {
            let clean = sanitize_text(&raw);
            if clean.is_empty() {
                Patch::Keep
            } else if clean.chars().count() > max_len {
                issues.push(FieldIssue::field(
                    field,
                    format!("must be at most {max_len} characters"),
                ));
                Patch::Keep
            } else {
                Patch::Set(clean)
            }
        }
    }
}
