//! Correction store
//!
//! Persists proposed corrections and drives their review lifecycle:
//!
//! ```text
//! pending ──approve──► approved  (merge triggered once)
//!    │
//!    └────reject────► rejected   (terminal, no side effect)
//! ```
//!
//! The `pending → *` flip is a conditional write guarded on
//! `status == pending`. Of any number of concurrent reviewers exactly one
//! wins the flip, and only that caller hands the correction to the
//! [`CorrectionApplier`].

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::model::{ChangeSet, CorrectionDoc, CorrectionStatus};
use crate::auth::{ensure_allowed, Operation, Principal};
use crate::db::{
    from_document, to_document, Document, DocumentStore, Filter, FindOptions, CORRECTION_COLLECTION,
};
use crate::schema::EntityKind;
use crate::types::{CodexError, FieldIssue, Result, ValidationErrors};

/// Merges an approved correction into its canonical record
#[async_trait::async_trait]
pub trait CorrectionApplier: Send + Sync {
    async fn apply(&self, correction: &CorrectionDoc, reviewer: &Principal) -> Result<()>;
}

/// Filters for listing corrections
#[derive(Debug, Clone, Default)]
pub struct CorrectionQuery {
    pub status: Option<CorrectionStatus>,
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<String>,
    pub submitted_by: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl CorrectionQuery {
    fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(status) = self.status {
            filter = filter.eq("status", status.as_str());
        }
        if let Some(kind) = self.entity_kind {
            filter = filter.eq("entity_kind", kind.as_str());
        }
        if let Some(ref id) = self.entity_id {
            filter = filter.eq("entity_id", id.as_str());
        }
        if let Some(ref user) = self.submitted_by {
            filter = filter.eq("submitted_by", user.as_str());
        }
        filter
    }
}

/// A page of corrections plus the total match count
#[derive(Debug, Clone)]
pub struct CorrectionPage {
    pub corrections: Vec<CorrectionDoc>,
    pub total: u64,
}

pub struct CorrectionStore {
    db: Arc<dyn DocumentStore>,
    applier: Arc<dyn CorrectionApplier>,
}

impl CorrectionStore {
    pub fn new(db: Arc<dyn DocumentStore>, applier: Arc<dyn CorrectionApplier>) -> Self {
        Self { db, applier }
    }

    /// Persist a new pending correction
    pub async fn create(
        &self,
        entity_kind: EntityKind,
        entity_id: &str,
        changes: ChangeSet,
        reason: &str,
        submitter: &Principal,
    ) -> Result<CorrectionDoc> {
        let mut issues = ValidationErrors::new();
        if changes.is_empty() {
            issues.push(FieldIssue::general("No changes detected"));
        }
        if reason.trim().is_empty() {
            issues.push(FieldIssue::field("reason", "is required"));
        }
        issues.into_result()?;

        if self.db.get(entity_kind.collection(), entity_id).await?.is_none() {
            return Err(CodexError::invalid(
                "entityId",
                format!("{entity_kind} '{entity_id}' does not exist"),
            ));
        }

        let correction = CorrectionDoc::new(entity_kind, entity_id, changes, reason, &submitter.user_id);
        self.db
            .insert(CORRECTION_COLLECTION, to_document(&correction)?)
            .await?;

        info!(
            correction_id = %correction.id,
            entity = %entity_kind,
            entity_id,
            submitted_by = %submitter.username,
            fields = correction.changes.len(),
            "Correction submitted"
        );
        Ok(correction)
    }

    pub async fn get(&self, correction_id: &str) -> Result<Option<CorrectionDoc>> {
        match self.db.get(CORRECTION_COLLECTION, correction_id).await? {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but `NotFound` when missing
    pub async fn require(&self, correction_id: &str) -> Result<CorrectionDoc> {
        self.get(correction_id)
            .await?
            .ok_or_else(|| CodexError::NotFound("Correction not found".into()))
    }

    /// Newest first
    pub async fn list(&self, query: &CorrectionQuery) -> Result<CorrectionPage> {
        let filter = query.filter();
        let options = FindOptions::page(query.page, query.limit).sorted_by("created_at", true);

        let docs = self.db.find(CORRECTION_COLLECTION, &filter, &options).await?;
        let total = self.db.count(CORRECTION_COLLECTION, &filter).await?;
        let corrections = docs
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<CorrectionDoc>>>()?;

        Ok(CorrectionPage { corrections, total })
    }

    pub async fn count_by_status(&self, status: CorrectionStatus) -> Result<u64> {
        self.db
            .count(CORRECTION_COLLECTION, &Filter::new().eq("status", status.as_str()))
            .await
    }

    /// Review a pending correction.
    ///
    /// Approving hands the correction to the applier; an apply failure is
    /// returned to the caller while the correction stays approved.
    pub async fn transition(
        &self,
        correction_id: &str,
        new_status: CorrectionStatus,
        reviewer: &Principal,
    ) -> Result<CorrectionDoc> {
        ensure_allowed(Operation::ReviewCorrection, reviewer)?;

        if new_status == CorrectionStatus::Pending {
            return Err(CodexError::invalid(
                "status",
                "must be either approved or rejected",
            ));
        }

        let current = self.require(correction_id).await?;
        if current.status != CorrectionStatus::Pending {
            return Err(already_reviewed(&current));
        }

        let now = Utc::now();
        let mut set = Document::new();
        set.insert("status".into(), Value::from(new_status.as_str()));
        set.insert("reviewed_by".into(), Value::from(reviewer.user_id.as_str()));
        set.insert("reviewed_at".into(), serde_json::to_value(now)?);
        set.insert("updated_at".into(), serde_json::to_value(now)?);

        let guard = Filter::new().eq("status", CorrectionStatus::Pending.as_str());
        let won = self
            .db
            .update_if(CORRECTION_COLLECTION, correction_id, &guard, set)
            .await?;

        if !won {
            debug!(correction_id, reviewer = %reviewer.username, "Lost review race");
            let latest = self.require(correction_id).await?;
            return Err(already_reviewed(&latest));
        }

        let reviewed = self.require(correction_id).await?;
        info!(
            correction_id,
            status = %new_status,
            reviewer = %reviewer.username,
            entity = %reviewed.entity_kind,
            entity_id = %reviewed.entity_id,
            "Correction reviewed"
        );

        if new_status == CorrectionStatus::Approved {
            if let Err(e) = self.applier.apply(&reviewed, reviewer).await {
                warn!(correction_id, error = %e, "Approved correction could not be applied");
                return Err(e);
            }
            return self.require(correction_id).await;
        }

        Ok(reviewed)
    }
}

fn already_reviewed(correction: &CorrectionDoc) -> CodexError {
    CodexError::Conflict(format!(
        "Correction has already been {}",
        correction.status
    ))
}
