//! Schema endpoints
//!
//! - `GET /schema/{kind}` - live schema, used to build correction forms
//! - `POST /admin/schema/{kind}/{field}/retire` - retire an enum option
//! - `POST /admin/schema/{kind}/{field}/restore` - restore an enum option
//!
//! `field` may name a sub-field of a list of records (`objectives.kind`).

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::common::{
    codex_error_response, method_not_allowed, not_found_response, parse_json, path_segment, require_principal,
    respond, FullBody,
};
use crate::auth::{ensure_allowed, Operation, Principal};
use crate::schema::{EntityKind, EntitySchema};
use crate::server::AppState;
use crate::types::Result;

#[derive(Debug, Deserialize)]
pub struct OptionRequest {
    pub option: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResponse {
    pub entity_type: EntityKind,
    pub field: String,
    pub option: String,
    /// False when the option was already in the requested state
    pub changed: bool,
}

/// `GET /schema/{kind}`
pub fn handle_schema_request(state: &AppState, req: &Request<Bytes>, path: &str) -> Response<FullBody> {
    if req.method() != Method::GET {
        return method_not_allowed();
    }
    let kind = path.strip_prefix("/schema/").unwrap_or("");
    respond(StatusCode::OK, get_schema(state, kind))
}

fn get_schema(state: &AppState, kind: &str) -> Result<EntitySchema> {
    let kind: EntityKind = kind.parse()?;
    Ok(state.registry.get(kind)?.as_ref().clone())
}

/// `POST /admin/schema/{kind}/{field}/{retire|restore}`
pub async fn handle_admin_schema_request(state: &AppState, req: &Request<Bytes>, path: &str) -> Response<FullBody> {
    if req.method() != Method::POST {
        return method_not_allowed();
    }

    let principal = match require_principal(req, state) {
        Ok(p) => p,
        Err(e) => return codex_error_response(&e),
    };

    let parts: Vec<&str> = path
        .strip_prefix("/admin/schema/")
        .unwrap_or("")
        .split('/')
        .collect();
    let [kind, field, action] = parts.as_slice() else {
        return not_found_response(path);
    };
    let retire = match *action {
        "retire" => true,
        "restore" => false,
        _ => return not_found_response(path),
    };

    respond(
        StatusCode::OK,
        update_option(state, req, &principal, kind, field, retire).await,
    )
}

async fn update_option(
    state: &AppState,
    req: &Request<Bytes>,
    principal: &Principal,
    kind: &str,
    field: &str,
    retire: bool,
) -> Result<OptionResponse> {
    ensure_allowed(Operation::ManageSchema, principal)?;
    let kind: EntityKind = kind.parse()?;
    let field = path_segment(field)?;
    let body: OptionRequest = parse_json(req)?;
    let option = body.option.trim().to_string();

    let changed = if retire {
        state.registry.retire_option(kind, &field, &option)?
    } else {
        state.registry.restore_option(kind, &field, &option)?
    };

    info!(
        admin = %principal.username,
        entity = %kind,
        field = %field,
        option = %option,
        retired = retire,
        changed,
        "Schema option updated"
    );
    Ok(OptionResponse {
        entity_type: kind,
        field,
        option,
        changed,
    })
}
