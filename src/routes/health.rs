//! Health check endpoint
//!
//! Liveness only: returns 200 whenever the process is serving requests.

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::common::{json_response, FullBody};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub mode: &'static str,
    pub cached_pages: usize,
    pub timestamp: String,
}

pub fn health_check(state: &AppState) -> Response<FullBody> {
    let body = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("CODEX_COMMIT").unwrap_or("unknown"),
        built_at: option_env!("CODEX_BUILT_AT").unwrap_or("unknown"),
        uptime: state.started_at.elapsed().as_secs(),
        mode: if state.args.dev_mode { "development" } else { "production" },
        cached_pages: state.cache.len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    json_response(StatusCode::OK, &body)
}
