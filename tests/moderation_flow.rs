//! Correction lifecycle tests
//!
//! Submission, review and merge of corrections against the in-memory store:
//! - the diff engine is pure
//! - unchanged candidates are rejected before anything is stored
//! - falsy values are real changes
//! - concurrent approvals merge exactly once
//! - merges preserve untouched fields
//! - enum options retired after submission fail the merge

use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use codex::auth::{Principal, Role};
use codex::cache::{PageCache, PageKey};
use codex::corrections::{
    diff, ApplyEngine, CorrectionApplier, CorrectionDoc, CorrectionService, CorrectionStatus, CorrectionStore,
    SubmitCorrection,
};
use codex::db::{memory_store, Document, DocumentStore, Filter, FindOptions, MemoryStore, CORRECTION_COLLECTION};
use codex::entities::{record_version, EntityRepository};
use codex::schema::task::{TaskObjective, TaskReward};
use codex::schema::{CorrectableEntity, EntityKind, SchemaRegistry, Task};
use codex::{CodexError, Result};

// =============================================================================
// Harness
// =============================================================================

/// In-memory store that yields to the scheduler before every operation, so
/// concurrent callers interleave between their reads and their writes.
/// Counts conditional writes whose guard no longer matched.
struct YieldingStore {
    inner: MemoryStore,
    guard_misses: AtomicUsize,
}

#[async_trait::async_trait]
impl DocumentStore for YieldingStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        tokio::task::yield_now().await;
        self.inner.get(collection, id).await
    }

    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>> {
        tokio::task::yield_now().await;
        self.inner.find(collection, filter, options).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        tokio::task::yield_now().await;
        self.inner.count(collection, filter).await
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<()> {
        tokio::task::yield_now().await;
        self.inner.insert(collection, doc).await
    }

    async fn update_if(&self, collection: &str, id: &str, guard: &Filter, set: Document) -> Result<bool> {
        tokio::task::yield_now().await;
        let written = self.inner.update_if(collection, id, guard, set).await?;
        if !written {
            self.guard_misses.fetch_add(1, Ordering::SeqCst);
        }
        Ok(written)
    }
}

/// Counts the merges the store hands out, delegating to the real engine
struct CountingApplier {
    inner: ApplyEngine,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl CorrectionApplier for CountingApplier {
    async fn apply(&self, correction: &CorrectionDoc, reviewer: &Principal) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.apply(correction, reviewer).await
    }
}

struct Harness {
    db: Arc<dyn DocumentStore>,
    backing: Arc<YieldingStore>,
    registry: Arc<SchemaRegistry>,
    cache: Arc<PageCache>,
    entities: EntityRepository,
    store: Arc<CorrectionStore>,
    service: CorrectionService,
    applier: Arc<CountingApplier>,
}

impl Harness {
    async fn new() -> Self {
        let backing = Arc::new(YieldingStore {
            inner: memory_store(),
            guard_misses: AtomicUsize::new(0),
        });
        let db: Arc<dyn DocumentStore> = backing.clone();
        let registry = Arc::new(SchemaRegistry::with_defaults());
        let cache = Arc::new(PageCache::default());
        let entities = EntityRepository::new(Arc::clone(&db));

        let applier = Arc::new(CountingApplier {
            inner: ApplyEngine::new(Arc::clone(&db), Arc::clone(&registry), Arc::clone(&cache)),
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(CorrectionStore::new(Arc::clone(&db), applier.clone()));
        let service = CorrectionService::new(Arc::clone(&registry), entities.clone(), Arc::clone(&store));

        entities.insert(&task()).await.unwrap();

        Self {
            db,
            backing,
            registry,
            cache,
            entities,
            store,
            service,
            applier,
        }
    }

    async fn submit(&self, candidate: Document) -> Result<CorrectionDoc> {
        self.service
            .submit(
                &user(),
                SubmitCorrection {
                    entity_type: "task".into(),
                    entity_id: "delivery".into(),
                    proposed_data: candidate,
                    reason: "Checked in game after the last patch".into(),
                },
            )
            .await
    }

    async fn stored_corrections(&self) -> u64 {
        self.db.count(CORRECTION_COLLECTION, &Filter::new()).await.unwrap()
    }

    async fn task(&self) -> Task {
        self.entities.get_typed::<Task>("delivery").await.unwrap().unwrap()
    }
}

fn task() -> Task {
    Task {
        id: "delivery".into(),
        name: "Delivery from the past".into(),
        trader: "quartermaster".into(),
        map: "factory".into(),
        min_level: 5,
        experience: 1200,
        kappa_required: true,
        wiki_url: Some("https://wiki.example.com/delivery".into()),
        prerequisites: vec!["debut".into()],
        objectives: vec![TaskObjective {
            kind: "handover".into(),
            description: "Stash the package in the factory".into(),
            count: Some(1),
            map: Some("factory".into()),
        }],
        rewards: vec![TaskReward {
            item: "roubles".into(),
            quantity: 15_000,
        }],
    }
}

/// Canonical record with some fields overridden
fn candidate(overrides: Value) -> Document {
    let mut record = task().to_record().unwrap();
    if let Value::Object(map) = overrides {
        record.extend(map);
    }
    record
}

fn user() -> Principal {
    Principal::new("u-1", "alice", [Role::User])
}

fn moderator(n: usize) -> Principal {
    Principal::new(format!("m-{n}"), format!("mod{n}"), [Role::User, Role::Moderator])
}

// =============================================================================
// Diff and submission
// =============================================================================

/// Test that the diff engine only reads its arguments
#[tokio::test]
async fn test_diff_is_pure() {
    let schema = Task::schema();
    let canonical = task().to_record().unwrap();
    let proposed = candidate(json!({ "min_level": 7, "note": "ignored" }));
    let (canonical_before, proposed_before) = (canonical.clone(), proposed.clone());

    let first = diff(&schema, &canonical, &proposed);
    let second = diff(&schema, &canonical, &proposed);

    assert_eq!(first, second);
    assert_eq!(first.fields().collect::<Vec<_>>(), vec!["min_level"]);
    assert_eq!(canonical, canonical_before);
    assert_eq!(proposed, proposed_before);
}

/// Test that an unchanged candidate is rejected and nothing is stored
#[tokio::test]
async fn test_unchanged_candidate_not_persisted() {
    let h = Harness::new().await;

    let err = h.submit(candidate(json!({}))).await.unwrap_err();
    let CodexError::Validation(issues) = err else {
        panic!("expected validation error");
    };
    assert!(issues.issues().iter().any(|i| i.message == "No changes detected"));
    assert_eq!(h.stored_corrections().await, 0);

    // Blank fields count as not provided
    let err = h
        .submit(candidate(json!({ "wiki_url": "", "map": null })))
        .await
        .unwrap_err();
    assert!(matches!(err, CodexError::Validation(_)));
    assert_eq!(h.stored_corrections().await, 0);
}

/// Test that false and zero are recorded as changes
#[tokio::test]
async fn test_falsy_values_are_changes() {
    let h = Harness::new().await;

    let correction = tokio_test::assert_ok!(
        h.submit(candidate(json!({ "kappa_required": false, "experience": 0 })))
            .await
    );

    assert_eq!(correction.changes.get("kappa_required"), Some(&Value::Bool(false)));
    assert_eq!(correction.changes.get("experience"), Some(&json!(0)));
    assert_eq!(correction.changes.len(), 2);
    assert_eq!(correction.status, CorrectionStatus::Pending);
    assert_eq!(h.stored_corrections().await, 1);
}

/// Test that every invalid field is reported at once
#[tokio::test]
async fn test_all_invalid_fields_reported() {
    let h = Harness::new().await;

    let err = h
        .submit(candidate(json!({
            "min_level": 500,
            "trader": "nobody",
            "rewards": [{ "item": "roubles", "quantity": 0 }]
        })))
        .await
        .unwrap_err();

    let CodexError::Validation(issues) = err else {
        panic!("expected validation error");
    };
    assert!(issues.has_field("min_level"));
    assert!(issues.has_field("trader"));
    assert!(issues.has_field("rewards[0].quantity"));
    assert_eq!(h.stored_corrections().await, 0);
}

// =============================================================================
// Review and merge
// =============================================================================

/// Test that concurrent approvals merge the correction exactly once
#[tokio::test]
async fn test_concurrent_approvals_apply_once() {
    let h = Harness::new().await;
    let correction = h.submit(candidate(json!({ "min_level": 9 }))).await.unwrap();

    let reviewers: Vec<Principal> = (0..8).map(moderator).collect();
    let misses_before = h.backing.guard_misses.load(Ordering::SeqCst);
    let results = join_all(
        reviewers
            .iter()
            .map(|r| h.store.transition(&correction.id, CorrectionStatus::Approved, r)),
    )
    .await;

    let won = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(CodexError::Conflict(_))))
        .count();
    assert_eq!(won, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(h.applier.calls.load(Ordering::SeqCst), 1);

    // Every reviewer read the correction as pending, so the losers were
    // turned away by the conditional write, not by the read
    assert_eq!(h.backing.guard_misses.load(Ordering::SeqCst) - misses_before, 7);

    let record = h.entities.get(EntityKind::Task, "delivery").await.unwrap().unwrap();
    assert_eq!(record_version(&record).unwrap(), 2);
    assert_eq!(h.task().await.min_level, 9);
}

/// Test that a merge changes only the corrected fields
#[tokio::test]
async fn test_merge_preserves_untouched_fields() {
    let h = Harness::new().await;
    let key = PageKey::entity(EntityKind::Task, "delivery");
    h.cache.put(&key, "{}".into());

    let correction = h
        .submit(candidate(json!({
            "kappa_required": false,
            "rewards": [
                { "item": "roubles", "quantity": 20000 },
                { "item": "gpu", "quantity": 1 }
            ]
        })))
        .await
        .unwrap();
    let approved = h
        .store
        .transition(&correction.id, CorrectionStatus::Approved, &moderator(1))
        .await
        .unwrap();

    assert_eq!(approved.status, CorrectionStatus::Approved);
    assert!(approved.apply.is_applied());

    let mut expected = task();
    expected.kappa_required = false;
    expected.rewards = vec![
        TaskReward {
            item: "roubles".into(),
            quantity: 20_000,
        },
        TaskReward {
            item: "gpu".into(),
            quantity: 1,
        },
    ];
    assert_eq!(h.task().await, expected);
    assert!(h.cache.get(&key).is_none());
}

/// Test that rejecting has no side effect and is terminal
#[tokio::test]
async fn test_reject_is_terminal() {
    let h = Harness::new().await;
    let correction = h.submit(candidate(json!({ "map": "forest" }))).await.unwrap();

    let rejected = h
        .store
        .transition(&correction.id, CorrectionStatus::Rejected, &moderator(1))
        .await
        .unwrap();
    assert_eq!(rejected.status, CorrectionStatus::Rejected);
    assert_eq!(h.applier.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.task().await, task());

    let again = h
        .store
        .transition(&correction.id, CorrectionStatus::Approved, &moderator(2))
        .await;
    assert!(matches!(again, Err(CodexError::Conflict(_))));
}

/// Test that users cannot review corrections
#[tokio::test]
async fn test_review_requires_moderator() {
    let h = Harness::new().await;
    let correction = h.submit(candidate(json!({ "map": "forest" }))).await.unwrap();

    let err = h
        .store
        .transition(&correction.id, CorrectionStatus::Approved, &user())
        .await
        .unwrap_err();
    assert!(matches!(err, CodexError::Authorization(_)));
    assert_eq!(
        err.public_message(),
        "You do not have permission to perform this action"
    );

    let stored = h.store.require(&correction.id).await.unwrap();
    assert_eq!(stored.status, CorrectionStatus::Pending);
}

/// Test that an option retired after submission fails the merge and leaves
/// the correction approved for manual reconciliation
#[tokio::test]
async fn test_retired_option_fails_merge() {
    let h = Harness::new().await;
    let correction = h.submit(candidate(json!({ "trader": "medic" }))).await.unwrap();

    h.registry
        .retire_option(EntityKind::Task, "trader", "medic")
        .unwrap();

    let err = h
        .store
        .transition(&correction.id, CorrectionStatus::Approved, &moderator(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CodexError::Validation(ref e) if e.has_field("trader")));

    let stored = h.store.require(&correction.id).await.unwrap();
    assert_eq!(stored.status, CorrectionStatus::Approved);
    assert!(stored.apply.is_failed());
    assert_eq!(h.task().await, task());

    // A second approval does not retry the merge
    let again = h
        .store
        .transition(&correction.id, CorrectionStatus::Approved, &moderator(2))
        .await;
    assert!(matches!(again, Err(CodexError::Conflict(_))));
    assert_eq!(h.applier.calls.load(Ordering::SeqCst), 1);
}

/// Test that moderators reconciling the same failed merge apply it once
#[tokio::test]
async fn test_concurrent_reapply_merges_once() {
    let h = Harness::new().await;
    let correction = h.submit(candidate(json!({ "trader": "medic" }))).await.unwrap();

    h.registry
        .retire_option(EntityKind::Task, "trader", "medic")
        .unwrap();
    let failed = h
        .store
        .transition(&correction.id, CorrectionStatus::Approved, &moderator(1))
        .await;
    assert!(matches!(failed, Err(CodexError::Validation(_))));
    h.registry
        .restore_option(EntityKind::Task, "trader", "medic")
        .unwrap();

    let reviewers: Vec<Principal> = (0..4).map(moderator).collect();
    let results = join_all(
        reviewers
            .iter()
            .map(|r| h.applier.inner.reapply(&correction.id, r)),
    )
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(CodexError::Conflict(_)))));

    let record = h.entities.get(EntityKind::Task, "delivery").await.unwrap().unwrap();
    assert_eq!(record_version(&record).unwrap(), 2);
    assert_eq!(h.task().await.trader, "medic");

    let stored = h.store.require(&correction.id).await.unwrap();
    assert!(stored.apply.is_applied());
}

/// Test that an unknown entity id is a validation error on entityId
#[tokio::test]
async fn test_unknown_entity_rejected() {
    let h = Harness::new().await;

    let err = h
        .service
        .submit(
            &user(),
            SubmitCorrection {
                entity_type: "task".into(),
                entity_id: "missing".into(),
                proposed_data: candidate(json!({ "min_level": 3 })),
                reason: "typo".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CodexError::Validation(ref e) if e.has_field("entityId")));
    assert_eq!(h.stored_corrections().await, 0);
}
