//! Correction submission pipeline
//!
//! candidate → normalise → diff against canonical → validate → persist.
//! An unchanged candidate is rejected before anything is stored.

use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::diff::diff;
use super::model::CorrectionDoc;
use super::store::CorrectionStore;
use super::validate::{normalize_candidate, validate_correction};
use crate::auth::{ensure_allowed, Operation, Principal};
use crate::db::Document;
use crate::entities::EntityRepository;
use crate::schema::{EntityKind, SchemaRegistry};
use crate::types::{CodexError, Result};

/// A correction as submitted from the edit form
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCorrection {
    pub entity_type: String,
    pub entity_id: String,
    /// Full or partial candidate record
    pub proposed_data: Document,
    #[serde(default)]
    pub reason: String,
}

pub struct CorrectionService {
    registry: Arc<SchemaRegistry>,
    entities: EntityRepository,
    store: Arc<CorrectionStore>,
}

impl CorrectionService {
    pub fn new(registry: Arc<SchemaRegistry>, entities: EntityRepository, store: Arc<CorrectionStore>) -> Self {
        Self {
            registry,
            entities,
            store,
        }
    }

    pub async fn submit(&self, submitter: &Principal, request: SubmitCorrection) -> Result<CorrectionDoc> {
        ensure_allowed(Operation::SubmitCorrection, submitter)?;

        let kind: EntityKind = request.entity_type.parse()?;
        let schema = self.registry.get(kind)?;

        let canonical = self
            .entities
            .get(kind, &request.entity_id)
            .await?
            .ok_or_else(|| {
                CodexError::invalid(
                    "entityId",
                    format!("{kind} '{}' does not exist", request.entity_id),
                )
            })?;

        let candidate = normalize_candidate(&schema, &request.proposed_data);
        let changes = diff(&schema, &canonical, &candidate);
        debug!(entity = %kind, entity_id = %request.entity_id, fields = changes.len(), "Computed correction diff");

        let changes = validate_correction(&schema, &changes, &request.reason)?;
        self.store
            .create(kind, &request.entity_id, changes, &request.reason, submitter)
            .await
    }
}
