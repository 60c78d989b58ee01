//! Moderation apply engine
//!
//! Merges approved corrections into canonical records. The schema may have
//! changed since the correction was submitted (enum options retire), so the
//! change-set is validated again against the live registry before anything
//! is written.
//!
//! The merge is a field-level overwrite: each changed field replaces the
//! stored value wholesale, untouched fields are left exactly as they were.
//! The write is guarded on the record's `version`, so a concurrent edit
//! surfaces as `Conflict` instead of being silently lost.
//!
//! Before merging, the caller claims the correction by moving its apply
//! state to `applying` with a conditional write. Only one caller can win
//! the claim, so a correction is merged at most once even when reviewers
//! reapply it concurrently. The outcome is then recorded against the claim.
//!
//! Any failure leaves the correction `approved` with its apply state set to
//! `failed`, for a moderator to reconcile with [`ApplyEngine::reapply`].

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::model::{ApplyState, CorrectionDoc, CorrectionStatus};
use super::store::CorrectionApplier;
use super::validate::validate_changes;
use crate::auth::{ensure_allowed, Operation, Principal};
use crate::cache::{PageCache, PageKey};
use crate::db::{from_document, Document, DocumentStore, Filter, CORRECTION_COLLECTION};
use crate::entities::{record_version, EntityRepository};
use crate::schema::SchemaRegistry;
use crate::types::{CodexError, Result};

const CLAIMED: &str = "applying";

pub struct ApplyEngine {
    db: Arc<dyn DocumentStore>,
    entities: EntityRepository,
    registry: Arc<SchemaRegistry>,
    cache: Arc<PageCache>,
}

impl ApplyEngine {
    pub fn new(db: Arc<dyn DocumentStore>, registry: Arc<SchemaRegistry>, cache: Arc<PageCache>) -> Self {
        Self {
            entities: EntityRepository::new(Arc::clone(&db)),
            db,
            registry,
            cache,
        }
    }

    /// Retry the merge of an approved correction whose apply failed
    pub async fn reapply(&self, correction_id: &str, reviewer: &Principal) -> Result<CorrectionDoc> {
        ensure_allowed(Operation::ReapplyCorrection, reviewer)?;

        let correction = self.load(correction_id).await?;
        if correction.status != CorrectionStatus::Approved || !correction.apply.is_failed() {
            return Err(CodexError::Conflict(format!(
                "Only approved corrections that failed to apply can be reapplied (status {}, apply {})",
                correction.status,
                correction.apply.name()
            )));
        }

        info!(correction_id, reviewer = %reviewer.username, "Reapplying correction");
        self.apply(&correction, reviewer).await?;
        self.load(correction_id).await
    }

    async fn load(&self, correction_id: &str) -> Result<CorrectionDoc> {
        let doc = self
            .db
            .get(CORRECTION_COLLECTION, correction_id)
            .await?
            .ok_or_else(|| CodexError::NotFound("Correction not found".into()))?;
        from_document(doc)
    }

    async fn merge(&self, correction: &CorrectionDoc, reviewer: &Principal) -> Result<()> {
        let kind = correction.entity_kind;
        let record = self
            .entities
            .get(kind, &correction.entity_id)
            .await?
            .ok_or_else(|| CodexError::NotFound(format!("{} '{}' no longer exists", kind, correction.entity_id)))?;
        let version = record_version(&record)?;

        let schema = self.registry.get(kind)?;
        let changes = validate_changes(&schema, &correction.changes)?;

        let now = Utc::now();
        let mut set: Document = changes.into_iter().collect();
        set.insert(
            "last_correction".into(),
            json!({
                "correction_id": correction.id,
                "approved_by": reviewer.user_id,
                "applied_at": now,
            }),
        );
        set.insert("updated_at".into(), serde_json::to_value(now)?);

        let written = self
            .entities
            .write_if_version(kind, &correction.entity_id, version, set)
            .await?;
        if !written {
            return Err(CodexError::Conflict(format!(
                "{} '{}' was modified while the correction was being applied",
                kind, correction.entity_id
            )));
        }

        let applied = ApplyState::Applied {
            by: reviewer.user_id.clone(),
            at: now,
        };
        // The record is merged now; a bookkeeping failure must not mark it failed
        match self.set_apply_state(&correction.id, CLAIMED, &applied).await {
            Ok(true) => {}
            Ok(false) => error!(correction_id = %correction.id, "Apply claim vanished after merge"),
            Err(e) => error!(correction_id = %correction.id, error = %e, "Could not record applied state"),
        }

        self.cache.invalidate(&PageKey::entity(kind, &correction.entity_id));
        self.cache.invalidate_prefix(&PageKey::entity_list_pattern(kind));

        info!(
            correction_id = %correction.id,
            entity = %kind,
            entity_id = %correction.entity_id,
            version = version + 1,
            approved_by = %reviewer.username,
            "Correction applied"
        );
        Ok(())
    }

    /// Take the merge of a correction. Fails with `Conflict` unless the
    /// stored apply state still matches the caller's copy.
    async fn claim(&self, correction: &CorrectionDoc, reviewer: &Principal) -> Result<()> {
        let from = match correction.apply {
            ApplyState::NotApplied | ApplyState::Failed { .. } => correction.apply.name(),
            ApplyState::Applying { .. } => {
                return Err(CodexError::Conflict("Correction is already being applied".into()))
            }
            ApplyState::Applied { .. } => {
                return Err(CodexError::Conflict("Correction has already been applied".into()))
            }
        };

        let claimed = ApplyState::Applying {
            by: reviewer.user_id.clone(),
            at: Utc::now(),
        };
        if !self.set_apply_state(&correction.id, from, &claimed).await? {
            debug!(correction_id = %correction.id, reviewer = %reviewer.username, "Lost apply claim");
            return Err(CodexError::Conflict(
                "Correction is already being applied or has been applied".into(),
            ));
        }
        Ok(())
    }

    /// Conditionally move the apply state. Returns false when the stored
    /// state is no longer `from`.
    async fn set_apply_state(&self, correction_id: &str, from: &str, state: &ApplyState) -> Result<bool> {
        let mut set = Document::new();
        set.insert("apply".into(), serde_json::to_value(state)?);
        set.insert("updated_at".into(), serde_json::to_value(Utc::now())?);

        let guard = Filter::new()
            .eq("status", CorrectionStatus::Approved.as_str())
            .eq("apply.state", from);
        self.db
            .update_if(CORRECTION_COLLECTION, correction_id, &guard, set)
            .await
    }

    async fn record_failure(&self, correction: &CorrectionDoc, cause: &CodexError) {
        let failed = ApplyState::Failed {
            error: cause.to_string(),
            at: Utc::now(),
        };
        match self.set_apply_state(&correction.id, CLAIMED, &failed).await {
            Ok(true) => {}
            Ok(false) => error!(correction_id = %correction.id, "Apply claim vanished before failure was recorded"),
            Err(e) => error!(correction_id = %correction.id, error = %e, "Could not record apply failure"),
        }
    }
}

#[async_trait::async_trait]
impl CorrectionApplier for ApplyEngine {
    async fn apply(&self, correction: &CorrectionDoc, reviewer: &Principal) -> Result<()> {
        self.claim(correction, reviewer).await?;

        match self.merge(correction, reviewer).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    correction_id = %correction.id,
                    entity = %correction.entity_kind,
                    entity_id = %correction.entity_id,
                    error = %e,
                    "Correction apply failed"
                );
                self.record_failure(correction, &e).await;
                Err(e)
            }
        }
    }
}

/// Audit stamp written onto merged records
pub fn last_correction(record: &Document) -> Option<&Value> {
    record.get("last_correction")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::corrections::model::ChangeSet;
    use crate::db::{to_document, MemoryStore};
    use crate::schema::{EntityKind, Task};
    use crate::schema::task::{TaskObjective, TaskReward};

    fn moderator() -> Principal {
        Principal::new("m-1", "mod", [Role::Moderator])
    }

    fn task() -> Task {
        Task {
            id: "t-1".into(),
            name: "Delivery".into(),
            trader: "fence".into(),
            map: "harbor".into(),
            min_level: 5,
            experience: 1200,
            kappa_required: true,
            wiki_url: None,
            prerequisites: vec![],
            objectives: vec![TaskObjective {
                kind: "handover".into(),
                description: "Hand over the package".into(),
                count: Some(1),
                map: None,
            }],
            rewards: vec![TaskReward {
                item: "roubles".into(),
                quantity: 15000,
            }],
        }
    }

    async fn setup() -> (ApplyEngine, Arc<MemoryStore>, Arc<SchemaRegistry>) {
        let db = Arc::new(MemoryStore::new());
        let registry = Arc::new(SchemaRegistry::with_defaults());
        let engine = ApplyEngine::new(db.clone(), registry.clone(), Arc::new(PageCache::default()));
        engine.entities.insert(&task()).await.unwrap();
        (engine, db, registry)
    }

    async fn approved(db: &MemoryStore, changes: ChangeSet) -> CorrectionDoc {
        let mut c = CorrectionDoc::new(EntityKind::Task, "t-1", changes, "fix", "u-1");
        c.status = CorrectionStatus::Approved;
        db.insert(CORRECTION_COLLECTION, to_document(&c).unwrap())
            .await
            .unwrap();
        c
    }

    #[tokio::test]
    async fn test_merge_preserves_untouched_fields() {
        let (engine, db, _) = setup().await;
        let mut changes = ChangeSet::new();
        changes.insert("kappa_required", Value::Bool(false));
        let c = approved(&db, changes).await;

        engine.apply(&c, &moderator()).await.unwrap();

        let merged = engine.entities.get_typed::<Task>("t-1").await.unwrap().unwrap();
        let mut expected = task();
        expected.kappa_required = false;
        assert_eq!(merged, expected);

        let record = engine.entities.get(EntityKind::Task, "t-1").await.unwrap().unwrap();
        assert_eq!(record_version(&record).unwrap(), 2);
        assert_eq!(last_correction(&record).unwrap()["correction_id"], c.id.as_str());

        let stored = engine.load(&c.id).await.unwrap();
        assert!(stored.apply.is_applied());
    }

    #[tokio::test]
    async fn test_retired_option_fails_apply() {
        let (engine, db, registry) = setup().await;
        let mut changes = ChangeSet::new();
        changes.insert("trader", Value::from("medic"));
        let c = approved(&db, changes).await;

        registry.retire_option(EntityKind::Task, "trader", "medic").unwrap();
        let err = engine.apply(&c, &moderator()).await.unwrap_err();
        assert!(matches!(err, CodexError::Validation(_)));

        let stored = engine.load(&c.id).await.unwrap();
        assert_eq!(stored.status, CorrectionStatus::Approved);
        assert!(stored.apply.is_failed());
        assert_eq!(engine.entities.get_typed::<Task>("t-1").await.unwrap(), Some(task()));

        // Restoring the option lets a moderator reconcile
        registry.restore_option(EntityKind::Task, "trader", "medic").unwrap();
        let reapplied = engine.reapply(&c.id, &moderator()).await.unwrap();
        assert!(reapplied.apply.is_applied());
    }

    #[tokio::test]
    async fn test_reapply_requires_failed_state() {
        let (engine, db, _) = setup().await;
        let mut changes = ChangeSet::new();
        changes.insert("min_level", Value::from(9));
        let c = approved(&db, changes).await;

        assert!(matches!(
            engine.reapply(&c.id, &moderator()).await,
            Err(CodexError::Conflict(_))
        ));
        assert!(matches!(
            engine.reapply(&c.id, &Principal::new("u", "u", [Role::User])).await,
            Err(CodexError::Authorization(_))
        ));
    }

    async fn failed(db: &MemoryStore, changes: ChangeSet) -> CorrectionDoc {
        let mut c = CorrectionDoc::new(EntityKind::Task, "t-1", changes, "fix", "u-1");
        c.status = CorrectionStatus::Approved;
        c.apply = ApplyState::Failed {
            error: "Task 't-1' was modified while the correction was being applied".into(),
            at: Utc::now(),
        };
        db.insert(CORRECTION_COLLECTION, to_document(&c).unwrap())
            .await
            .unwrap();
        c
    }

    #[tokio::test]
    async fn test_stale_copy_merges_once() {
        let (engine, db, _) = setup().await;
        let mut changes = ChangeSet::new();
        changes.insert("min_level", Value::from(9));
        let c = failed(&db, changes).await;

        engine.apply(&c, &moderator()).await.unwrap();
        let err = engine.apply(&c, &moderator()).await.unwrap_err();
        assert!(matches!(err, CodexError::Conflict(_)));

        let record = engine.entities.get(EntityKind::Task, "t-1").await.unwrap().unwrap();
        assert_eq!(record_version(&record).unwrap(), 2);

        // The losing call must not overwrite the recorded outcome
        let stored = engine.load(&c.id).await.unwrap();
        assert!(stored.apply.is_applied());
        assert!(matches!(
            engine.reapply(&c.id, &moderator()).await,
            Err(CodexError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_claimed_correction_not_applied_again() {
        let (engine, db, _) = setup().await;
        let mut changes = ChangeSet::new();
        changes.insert("min_level", Value::from(9));
        let mut c = approved(&db, changes).await;

        c.apply = ApplyState::Applying {
            by: "m-2".into(),
            at: Utc::now(),
        };
        let err = engine.apply(&c, &moderator()).await.unwrap_err();
        assert!(matches!(err, CodexError::Conflict(_)));
        assert_eq!(engine.entities.get_typed::<Task>("t-1").await.unwrap(), Some(task()));

        // Nothing was claimed, so the stored state is untouched
        let stored = engine.load(&c.id).await.unwrap();
        assert_eq!(stored.apply, ApplyState::NotApplied);
    }

    #[tokio::test]
    async fn test_apply_uses_current_version() {
        let (engine, db, _) = setup().await;
        let mut changes = ChangeSet::new();
        changes.insert("min_level", Value::from(9));
        let c = approved(&db, changes).await;

        // Simulate a concurrent writer bumping the version between read and write
        let mut bump = Document::new();
        bump.insert("name".into(), Value::from("Delivery (updated)"));
        engine
            .entities
            .write_if_version(EntityKind::Task, "t-1", 1, bump)
            .await
            .unwrap();
        let mut stale = Document::new();
        stale.insert("min_level".into(), Value::from(9));
        assert!(!engine
            .entities
            .write_if_version(EntityKind::Task, "t-1", 1, stale)
            .await
            .unwrap());

        // The engine reads the current version, so its own merge still lands
        engine.apply(&c, &moderator()).await.unwrap();
        let merged = engine.entities.get_typed::<Task>("t-1").await.unwrap().unwrap();
        assert_eq!(merged.name, "Delivery (updated)");
        assert_eq!(merged.min_level, 9);
    }
}
