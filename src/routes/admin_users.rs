//! Admin API endpoints for user management
//!
//! ## Endpoints
//!
//! - `GET /admin/users` - List users with pagination, search, filter
//! - `GET /admin/users/{id}` - Get user details
//! - `PUT /admin/users/{id}` - Partial update `{ "fields": { ... } }`
//!
//! ## Authentication
//!
//! All endpoints require the admin role via JWT token. List and detail
//! pages are page-cached; an update invalidates the pages it affects.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use super::common::{
    cached_page, codex_error_response, not_found_response, pagination, parse_json, query_params,
    require_principal, respond, FullBody,
};
use crate::auth::{ensure_allowed, Operation, Principal, Role};
use crate::cache::PageKey;
use crate::server::AppState;
use crate::types::{CodexError, Result};
use crate::users::{Rank, UserDoc, UserQuery, UserUpdate};

/// User as shown in the admin back-office
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    pub id: String,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub rank: Rank,
    pub roles: BTreeSet<Role>,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserDoc> for UserDetail {
    fn from(user: UserDoc) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            bio: user.bio,
            rank: user.rank,
            roles: user.roles,
            banned: user.banned,
            ban_reason: user.ban_reason,
            version: user.version,
            created_at: user.metadata.created_at,
            updated_at: user.metadata.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub users: Vec<UserDetail>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

// =============================================================================
// Router
// =============================================================================

pub async fn handle_admin_users_request(state: &AppState, req: &Request<Bytes>, path: &str) -> Response<FullBody> {
    let principal = match require_principal(req, state) {
        Ok(p) => p,
        Err(e) => return codex_error_response(&e),
    };

    // Extract subpath after /admin/users
    let subpath = path.strip_prefix("/admin/users").unwrap_or("");

    match (req.method().clone(), subpath) {
        // GET /admin/users - List users
        (Method::GET, "") | (Method::GET, "/") => handle_list_users(state, req, &principal).await,

        // GET /admin/users/{id} - Get user details
        (Method::GET, p) if p.matches('/').count() == 1 => {
            handle_get_user(state, req, &principal, p.trim_start_matches('/')).await
        }

        // PUT /admin/users/{id} - Update user
        (Method::PUT, p) if p.matches('/').count() == 1 => {
            let id = p.trim_start_matches('/');
            respond(StatusCode::OK, update_user(state, req, &principal, id).await)
        }

        _ => not_found_response(path),
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_list_users(state: &AppState, req: &Request<Bytes>, principal: &Principal) -> Response<FullBody> {
    if let Err(e) = ensure_allowed(Operation::ViewUsers, principal) {
        return codex_error_response(&e);
    }

    let query = match user_query(&query_params(req)) {
        Ok(q) => q,
        Err(e) => return codex_error_response(&e),
    };
    let key = PageKey::admin_user_list(req.uri().query().unwrap_or(""));

    cached_page(state, req, key, || async move {
        let result = state.users.list_users(principal, &query).await?;
        Ok(UserListResponse {
            users: result.users.into_iter().map(Into::into).collect(),
            total: result.total,
            page: query.page.max(1),
            limit: query.limit.clamp(1, 100),
        })
    })
    .await
}

async fn handle_get_user(
    state: &AppState,
    req: &Request<Bytes>,
    principal: &Principal,
    user_id: &str,
) -> Response<FullBody> {
    if let Err(e) = ensure_allowed(Operation::ViewUsers, principal) {
        return codex_error_response(&e);
    }

    let key = PageKey::admin_user_edit(user_id);
    cached_page(state, req, key, || async move {
        let user = state.users.get_user(principal, user_id).await?;
        Ok(UserDetail::from(user))
    })
    .await
}

async fn update_user(state: &AppState, req: &Request<Bytes>, principal: &Principal, user_id: &str) -> Result<UserDetail> {
    let body: Value = parse_json(req)?;
    let fields = body
        .get("fields")
        .cloned()
        .ok_or_else(|| CodexError::invalid("fields", "is required"))?;
    let update: UserUpdate =
        serde_json::from_value(fields).map_err(|e| CodexError::invalid("fields", e.to_string()))?;

    let user = state.users.update_user(principal, user_id, update).await?;
    Ok(user.into())
}

/// Parse list filters from query parameters
fn user_query(params: &HashMap<String, String>) -> Result<UserQuery> {
    let (page, limit) = pagination(params);

    let role = match params.get("role").map(|r| r.trim()) {
        None | Some("") => None,
        Some(r) => Some(r.parse::<Role>().map_err(|msg| CodexError::invalid("role", msg))?),
    };

    let banned = match params
        .get("banned")
        .or_else(|| params.get("isBanned"))
        .map(|b| b.trim())
    {
        None | Some("") => None,
        Some(b) => Some(
            b.parse::<bool>()
                .map_err(|_| CodexError::invalid("banned", "must be true or false"))?,
        ),
    };

    Ok(UserQuery {
        search: params.get("search").cloned().filter(|s| !s.trim().is_empty()),
        role,
        banned,
        page,
        limit,
    })
}
