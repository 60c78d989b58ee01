//! Correction endpoints for signed-in users
//!
//! ## Endpoints
//!
//! - `POST /corrections` - Submit a correction
//! - `GET /corrections` - List the caller's own corrections
//! - `GET /corrections/{id}` - View a correction (submitter or moderator)

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::info;

use super::common::{
    codex_error_response, not_found_response, pagination, parse_json, query_params, require_principal, respond,
    FullBody,
};
use crate::auth::{ensure_allowed, Operation, Principal};
use crate::corrections::{ApplyState, ChangeSet, CorrectionDoc, CorrectionPage, CorrectionQuery, CorrectionStatus, SubmitCorrection};
use crate::schema::EntityKind;
use crate::server::AppState;
use crate::types::Result;

/// Correction as returned to clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionResponse {
    pub id: String,
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub changes: ChangeSet,
    pub reason: String,
    pub submitted_by: String,
    pub status: CorrectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub apply_state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CorrectionDoc> for CorrectionResponse {
    fn from(c: CorrectionDoc) -> Self {
        let apply_error = match c.apply {
            ApplyState::Failed { ref error, .. } => Some(error.clone()),
            _ => None,
        };
        Self {
            apply_state: c.apply.name(),
            apply_error,
            id: c.id,
            entity_type: c.entity_kind,
            entity_id: c.entity_id,
            changes: c.changes,
            reason: c.reason,
            submitted_by: c.submitted_by,
            status: c.status,
            reviewed_by: c.reviewed_by,
            reviewed_at: c.reviewed_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionListResponse {
    pub corrections: Vec<CorrectionResponse>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl CorrectionListResponse {
    pub fn new(result: CorrectionPage, page: u32, limit: u32) -> Self {
        Self {
            corrections: result.corrections.into_iter().map(Into::into).collect(),
            total: result.total,
            page: page.max(1),
            limit,
        }
    }
}

pub async fn handle_corrections_request(state: &AppState, req: &Request<Bytes>, path: &str) -> Response<FullBody> {
    let principal = match require_principal(req, state) {
        Ok(p) => p,
        Err(e) => return codex_error_response(&e),
    };

    let subpath = path.strip_prefix("/corrections").unwrap_or("");

    match (req.method().clone(), subpath) {
        (Method::POST, "") | (Method::POST, "/") => {
            respond(StatusCode::CREATED, submit(state, req, &principal).await)
        }
        (Method::GET, "") | (Method::GET, "/") => respond(StatusCode::OK, list_own(state, req, &principal).await),
        (Method::GET, p) if p.matches('/').count() == 1 => {
            let id = p.trim_start_matches('/');
            respond(StatusCode::OK, view(state, &principal, id).await)
        }
        _ => not_found_response(path),
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn submit(state: &AppState, req: &Request<Bytes>, principal: &Principal) -> Result<CorrectionResponse> {
    let request: SubmitCorrection = parse_json(req)?;
    let correction = state.submissions.submit(principal, request).await?;
    info!(
        correction_id = %correction.id,
        user = %principal.username,
        "Correction submission accepted"
    );
    Ok(correction.into())
}

async fn list_own(state: &AppState, req: &Request<Bytes>, principal: &Principal) -> Result<CorrectionListResponse> {
    let (page, limit) = pagination(&query_params(req));
    let query = CorrectionQuery {
        submitted_by: Some(principal.user_id.clone()),
        page,
        limit,
        ..Default::default()
    };
    let result = state.corrections.list(&query).await?;
    Ok(CorrectionListResponse::new(result, page, limit.clamp(1, 100)))
}

async fn view(state: &AppState, principal: &Principal, id: &str) -> Result<CorrectionResponse> {
    let correction = state.corrections.require(id).await?;
    if correction.submitted_by != principal.user_id {
        ensure_allowed(Operation::ViewAnyCorrection, principal)?;
    }
    Ok(correction.into())
}
