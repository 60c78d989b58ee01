//! Public canonical record endpoints
//!
//! - `GET /entities/{kind}` - paginated list
//! - `GET /entities/{kind}/{id}` - one record
//!
//! Both are served through the page cache; merges invalidate them.

use bytes::Bytes;
use hyper::{Method, Request, Response};
use serde::Serialize;
use serde_json::Value;

use super::common::{
    cached_page, codex_error_response, method_not_allowed, not_found_response, pagination, path_segment,
    query_params, FullBody,
};
use crate::cache::PageKey;
use crate::db::Document;
use crate::entities::schema_fields;
use crate::schema::EntityKind;
use crate::server::AppState;
use crate::types::{CodexError, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityListResponse {
    pub entity_type: EntityKind,
    pub records: Vec<Document>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResponse {
    pub entity_type: EntityKind,
    pub record: Document,
    /// Fields a correction may touch, prefilled into the edit form
    pub editable: Document,
    /// Audit stamp of the last merged correction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_correction: Option<Value>,
}

pub async fn handle_entities_request(state: &AppState, req: &Request<Bytes>, path: &str) -> Response<FullBody> {
    if req.method() != Method::GET {
        return method_not_allowed();
    }

    let subpath = path.strip_prefix("/entities/").unwrap_or("");
    let (kind, id) = match subpath.split_once('/') {
        Some((kind, id)) if !id.is_empty() && !id.contains('/') => (kind, Some(id)),
        Some((kind, "")) => (kind, None),
        Some(_) => return not_found_response(path),
        None => (subpath, None),
    };

    let kind: EntityKind = match kind.parse() {
        Ok(kind) => kind,
        Err(_) => return codex_error_response(&CodexError::NotFound(format!("Unknown entity type '{kind}'"))),
    };

    match id {
        Some(raw) => match path_segment(raw) {
            Ok(id) => get_entity(state, req, kind, id).await,
            Err(e) => codex_error_response(&e),
        },
        None => list_entities(state, req, kind).await,
    }
}

async fn list_entities(state: &AppState, req: &Request<Bytes>, kind: EntityKind) -> Response<FullBody> {
    let (page, limit) = pagination(&query_params(req));
    let key = PageKey::EntityList { kind, page, limit };

    cached_page(state, req, key, || async move {
        let result = state.entities.list(kind, page, limit).await?;
        Ok(EntityListResponse {
            entity_type: kind,
            records: result.records,
            total: result.total,
            page: result.page,
            limit: result.limit,
        })
    })
    .await
}

async fn get_entity(state: &AppState, req: &Request<Bytes>, kind: EntityKind, id: String) -> Response<FullBody> {
    let key = PageKey::entity(kind, &id);

    cached_page(state, req, key, || async move { load_entity(state, kind, &id).await }).await
}

async fn load_entity(state: &AppState, kind: EntityKind, id: &str) -> Result<EntityResponse> {
    let mut record = state
        .entities
        .get(kind, id)
        .await?
        .ok_or_else(|| CodexError::NotFound(format!("{kind} '{id}' not found")))?;
    let last_correction = record.remove("last_correction");
    let editable = schema_fields(&*state.registry.get(kind)?, &record);
    Ok(EntityResponse {
        entity_type: kind,
        record,
        editable,
        last_correction,
    })
}
