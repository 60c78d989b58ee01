//! Shared helpers for route handlers
//!
//! JSON responses, the public error body, bearer-token principals, query
//! strings and page-cached responses.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, error};

use crate::auth::{extract_token_from_header, Principal};
use crate::cache::PageKey;
use crate::server::AppState;
use crate::types::{CodexError, FieldIssue, Result};

pub type FullBody = Full<Bytes>;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldIssue>>,
}

// =============================================================================
// Responses
// =============================================================================

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    json_bytes_response(status, Bytes::from(json))
}

fn json_bytes_response(status: StatusCode, body: Bytes) -> Response<FullBody> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

pub fn error_response(status: StatusCode, error: &str, code: &str) -> Response<FullBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
            fields: None,
        },
    )
}

/// Map an error to its public response.
///
/// Infrastructure failures are logged here with their details; the caller
/// only ever sees the generic retry message.
pub fn codex_error_response(err: &CodexError) -> Response<FullBody> {
    if err.is_domain() {
        debug!(code = err.code(), error = %err, "Request rejected");
    } else {
        error!(code = err.code(), error = %err, "Request failed");
    }

    json_response(
        err.status_code(),
        &ErrorResponse {
            error: err.public_message(),
            code: err.code().to_string(),
            fields: err.field_issues().map(|issues| issues.to_vec()),
        },
    )
}

/// `Ok` as JSON with the given status, `Err` as the public error body
pub fn respond<T: Serialize>(status: StatusCode, result: Result<T>) -> Response<FullBody> {
    match result {
        Ok(body) => json_response(status, &body),
        Err(e) => codex_error_response(&e),
    }
}

pub fn not_found_response(path: &str) -> Response<FullBody> {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("No route for {path}"),
        "NOT_FOUND",
    )
}

pub fn method_not_allowed() -> Response<FullBody> {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "Method not allowed",
        "METHOD_NOT_ALLOWED",
    )
}

// =============================================================================
// Request helpers
// =============================================================================

/// Parse a JSON body. Malformed input is a validation error on `body`.
pub fn parse_json<T: DeserializeOwned>(req: &Request<Bytes>) -> Result<T> {
    if req.body().is_empty() {
        return Err(CodexError::invalid("body", "request body is required"));
    }
    serde_json::from_slice(req.body()).map_err(|e| CodexError::invalid("body", e.to_string()))
}

/// Principal named by the bearer token, `Auth` error without a valid one
pub fn require_principal(req: &Request<Bytes>, state: &AppState) -> Result<Principal> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = extract_token_from_header(header)
        .ok_or_else(|| CodexError::Auth("No token provided".into()))?;
    state.jwt.verify(token)
}

/// Decoded query string parameters. Later duplicates win.
pub fn query_params(req: &Request<Bytes>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = req.uri().query() {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = value.replace('+', " ");
            let value = urlencoding::decode(&value)
                .map(|v| v.into_owned())
                .unwrap_or_default();
            params.insert(key.to_string(), value);
        }
    }
    params
}

/// Decode one percent-encoded path segment
pub fn path_segment(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| CodexError::invalid("path", "is not valid UTF-8"))
}

/// Parse page and limit, defaulting to the first page of 20
pub fn pagination(params: &HashMap<String, String>) -> (u32, u32) {
    let page = params.get("page").and_then(|v| v.parse().ok()).unwrap_or(1);
    let limit = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    (page, limit)
}

// =============================================================================
// Page cache
// =============================================================================

/// Serve a page from the cache, rendering and storing it on a miss.
///
/// Cached pages carry an `ETag`; a matching `If-None-Match` gets `304`.
pub async fn cached_page<T, F, Fut>(
    state: &AppState,
    req: &Request<Bytes>,
    key: PageKey,
    render: F,
) -> Response<FullBody>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let (page, hit) = match state.cache.get(&key) {
        Some(page) => (page, true),
        None => match render().await {
            Ok(body) => match serde_json::to_vec(&body) {
                Ok(json) => (state.cache.put(&key, Bytes::from(json)), false),
                Err(e) => return codex_error_response(&CodexError::from(e)),
            },
            Err(e) => return codex_error_response(&e),
        },
    };

    let not_modified = req
        .headers()
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|tag| tag == page.etag);

    let mut response = if not_modified {
        let mut r = Response::new(Full::new(Bytes::new()));
        *r.status_mut() = StatusCode::NOT_MODIFIED;
        r
    } else {
        json_bytes_response(StatusCode::OK, page.body.clone())
    };

    let headers = response.headers_mut();
    if let Ok(etag) = HeaderValue::from_str(&page.etag) {
        headers.insert(header::ETAG, etag);
    }
    headers.insert(
        "X-Cache",
        HeaderValue::from_static(if hit { "HIT" } else { "MISS" }),
    );
    response
}
