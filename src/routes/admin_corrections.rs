//! Moderation endpoints
//!
//! ## Endpoints
//!
//! - `GET /admin/corrections` - Review queue (status, entityType, entityId, page, limit)
//! - `POST /admin/corrections/{id}/review` - Approve or reject a pending correction
//! - `POST /admin/corrections/{id}/reapply` - Retry a failed merge
//!
//! ## Authentication
//!
//! All endpoints require the moderator or admin role via JWT token.

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use tracing::info;

use super::common::{codex_error_response, not_found_response, parse_json, require_principal, respond, FullBody};
use super::corrections::{CorrectionListResponse, CorrectionResponse};
use crate::auth::{ensure_allowed, Operation, Principal};
use crate::corrections::{CorrectionQuery, CorrectionStatus};
use crate::schema::EntityKind;
use crate::server::AppState;
use crate::types::{CodexError, Result};

/// Query parameters for the review queue
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListCorrectionsParams {
    pub status: Option<String>,
    #[serde(alias = "entity_type")]
    pub entity_type: Option<String>,
    #[serde(alias = "entity_id")]
    pub entity_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListCorrectionsParams {
    fn from_query(query: Option<&str>) -> Result<Self> {
        match query {
            Some(q) if !q.is_empty() => serde_urlencoded::from_str(q)
                .map_err(|e| CodexError::invalid("query", e.to_string())),
            _ => Ok(Self::default()),
        }
    }

    fn into_query(self) -> Result<CorrectionQuery> {
        let status = match self.status.as_deref() {
            None | Some("") | Some("all") => None,
            Some(s) => Some(s.parse::<CorrectionStatus>()?),
        };
        let entity_kind = match self.entity_type.as_deref() {
            None | Some("") => None,
            Some(s) => Some(s.parse::<EntityKind>()?),
        };
        Ok(CorrectionQuery {
            status,
            entity_kind,
            entity_id: self.entity_id.filter(|id| !id.is_empty()),
            submitted_by: None,
            page: self.page.unwrap_or(1),
            limit: self.limit.unwrap_or(20),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: String,
}

pub async fn handle_admin_corrections_request(
    state: &AppState,
    req: &Request<Bytes>,
    path: &str,
) -> Response<FullBody> {
    let principal = match require_principal(req, state) {
        Ok(p) => p,
        Err(e) => return codex_error_response(&e),
    };

    let subpath = path.strip_prefix("/admin/corrections").unwrap_or("");

    match (req.method().clone(), subpath) {
        // GET /admin/corrections - Review queue
        (Method::GET, "") | (Method::GET, "/") => respond(StatusCode::OK, list(state, req, &principal).await),

        // POST /admin/corrections/{id}/review
        (Method::POST, p) if p.ends_with("/review") => {
            let id = extract_id(p, "/review");
            respond(StatusCode::OK, review(state, req, &principal, id).await)
        }

        // POST /admin/corrections/{id}/reapply
        (Method::POST, p) if p.ends_with("/reapply") => {
            let id = extract_id(p, "/reapply");
            respond(StatusCode::OK, reapply(state, &principal, id).await)
        }

        _ => not_found_response(path),
    }
}

fn extract_id<'a>(subpath: &'a str, suffix: &str) -> &'a str {
    subpath
        .trim_start_matches('/')
        .strip_suffix(suffix)
        .unwrap_or("")
}

// =============================================================================
// Handlers
// =============================================================================

async fn list(state: &AppState, req: &Request<Bytes>, principal: &Principal) -> Result<CorrectionListResponse> {
    ensure_allowed(Operation::ViewAnyCorrection, principal)?;

    let query = ListCorrectionsParams::from_query(req.uri().query())?.into_query()?;
    let (page, limit) = (query.page, query.limit.clamp(1, 100));
    let result = state.corrections.list(&query).await?;
    Ok(CorrectionListResponse::new(result, page, limit))
}

async fn review(state: &AppState, req: &Request<Bytes>, principal: &Principal, id: &str) -> Result<CorrectionResponse> {
    if id.is_empty() {
        return Err(CodexError::NotFound("Correction not found".into()));
    }
    let body: ReviewRequest = parse_json(req)?;
    let decision: CorrectionStatus = body
        .decision
        .parse()
        .map_err(|_| CodexError::invalid("decision", "must be either approved or rejected"))?;

    let reviewed = state.corrections.transition(id, decision, principal).await?;
    info!(
        correction_id = id,
        decision = %decision,
        reviewer = %principal.username,
        "Review recorded"
    );
    Ok(reviewed.into())
}

async fn reapply(state: &AppState, principal: &Principal, id: &str) -> Result<CorrectionResponse> {
    if id.is_empty() {
        return Err(CodexError::NotFound("Correction not found".into()));
    }
    let correction = state.apply_engine.reapply(id, principal).await?;
    Ok(correction.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_from_query() {
        let params = ListCorrectionsParams::from_query(Some("status=pending&entityType=hideout-upgrade&page=2")).unwrap();
        let query = params.into_query().unwrap();
        assert_eq!(query.status, Some(CorrectionStatus::Pending));
        assert_eq!(query.entity_kind, Some(EntityKind::HideoutUpgrade));
        assert_eq!(query.page, 2);
        assert_eq!(query.limit, 20);
    }

    #[test]
    fn test_list_params_reject_bad_status() {
        let params = ListCorrectionsParams::from_query(Some("status=maybe")).unwrap();
        assert!(matches!(params.into_query(), Err(CodexError::Validation(_))));
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(extract_id("/abc-123/review", "/review"), "abc-123");
        assert_eq!(extract_id("/review", "/review"), "");
    }
}
