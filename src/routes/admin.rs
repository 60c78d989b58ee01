//! Dashboard statistics
//!
//! `GET /admin/stats` - review queue depth, failed merges, record and user
//! counts, page cache counters. Moderators and admins.

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;

use super::common::{codex_error_response, method_not_allowed, require_principal, respond, FullBody};
use crate::auth::{ensure_allowed, Operation, Principal};
use crate::cache::CacheStats;
use crate::corrections::CorrectionStatus;
use crate::db::{Filter, CORRECTION_COLLECTION, USER_COLLECTION};
use crate::schema::EntityKind;
use crate::server::AppState;
use crate::types::Result;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionStats {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    /// Approved but not merged, awaiting reapply
    pub apply_failed: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub corrections: CorrectionStats,
    pub entities: BTreeMap<&'static str, u64>,
    pub users: u64,
    pub banned_users: u64,
    pub cache: CacheStats,
}

pub async fn handle_stats_request(state: &AppState, req: &Request<Bytes>) -> Response<FullBody> {
    if req.method() != Method::GET {
        return method_not_allowed();
    }

    let principal = match require_principal(req, state) {
        Ok(p) => p,
        Err(e) => return codex_error_response(&e),
    };

    respond(StatusCode::OK, collect_stats(state, &principal).await)
}

async fn collect_stats(state: &AppState, principal: &Principal) -> Result<StatsResponse> {
    ensure_allowed(Operation::ViewStats, principal)?;

    let corrections = CorrectionStats {
        pending: state.corrections.count_by_status(CorrectionStatus::Pending).await?,
        approved: state.corrections.count_by_status(CorrectionStatus::Approved).await?,
        rejected: state.corrections.count_by_status(CorrectionStatus::Rejected).await?,
        apply_failed: state
            .db
            .count(CORRECTION_COLLECTION, &Filter::new().eq("apply.state", "failed"))
            .await?,
    };

    let mut entities = BTreeMap::new();
    for kind in EntityKind::ALL {
        let count = state.db.count(kind.collection(), &Filter::new()).await?;
        entities.insert(kind.as_str(), count);
    }

    Ok(StatsResponse {
        corrections,
        entities,
        users: state.db.count(USER_COLLECTION, &Filter::new()).await?,
        banned_users: state
            .db
            .count(USER_COLLECTION, &Filter::new().eq("banned", true))
            .await?,
        cache: state.cache.stats(),
    })
}
