//! In-memory document store
//!
//! Used in development mode when MongoDB is unreachable, and by tests.
//! Each collection sits behind its own lock so that guarded updates and
//! unique-field checks are atomic with respect to each other, mirroring
//! MongoDB's single-document atomicity and unique indexes.

use dashmap::DashMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::store::{lookup_path, Document, DocumentStore, Filter, FindOptions, ID_FIELD};
use crate::types::{CodexError, Result};

type Collection = Arc<RwLock<BTreeMap<String, Document>>>;

#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Collection>,
    unique_fields: HashMap<String, Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a unique field on a collection (builder style)
    pub fn with_unique(mut self, collection: &str, field: &str) -> Self {
        self.unique_fields
            .entry(collection.to_string())
            .or_default()
            .push(field.to_string());
        self
    }

    fn collection(&self, name: &str) -> Collection {
        Arc::clone(
            self.collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(BTreeMap::new())))
                .value(),
        )
    }

    /// Check unique fields of `candidate` against every other document
    fn check_unique(
        &self,
        collection: &str,
        docs: &BTreeMap<String, Document>,
        id: &str,
        candidate: &Document,
    ) -> Result<()> {
        let Some(fields) = self.unique_fields.get(collection) else {
            return Ok(());
        };

        for field in fields {
            let Some(value) = candidate.get(field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let taken = docs
                .iter()
                .any(|(other_id, other)| other_id != id && other.get(field) == Some(value));
            if taken {
                return Err(CodexError::Conflict(format!(
                    "Duplicate value for unique field '{field}' in {collection}"
                )));
            }
        }
        Ok(())
    }
}

fn poisoned(collection: &str) -> CodexError {
    CodexError::Internal(format!("Collection lock poisoned: {collection}"))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let coll = self.collection(collection);
        let docs = coll.read().map_err(|_| poisoned(collection))?;
        Ok(docs.get(id).cloned())
    }

    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>> {
        let coll = self.collection(collection);
        let docs = coll.read().map_err(|_| poisoned(collection))?;

        let mut matched: Vec<&Document> = docs.values().filter(|d| filter.matches(d)).collect();

        if let Some(ref sort_by) = options.sort_by {
            matched.sort_by(|a, b| {
                let ord = compare_values(lookup_path(a, sort_by), lookup_path(b, sort_by));
                if options.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        Ok(matched
            .into_iter()
            .skip(options.skip as usize)
            .take(options.limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let coll = self.collection(collection);
        let docs = coll.read().map_err(|_| poisoned(collection))?;
        Ok(docs.values().filter(|d| filter.matches(d)).count() as u64)
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<()> {
        let id = doc
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| CodexError::Internal("Document has no string id".into()))?
            .to_string();

        let coll = self.collection(collection);
        let mut docs = coll.write().map_err(|_| poisoned(collection))?;

        if docs.contains_key(&id) {
            return Err(CodexError::Conflict(format!(
                "Document {id} already exists in {collection}"
            )));
        }
        self.check_unique(collection, &docs, &id, &doc)?;

        docs.insert(id, doc);
        Ok(())
    }

    async fn update_if(&self, collection: &str, id: &str, guard: &Filter, set: Document) -> Result<bool> {
        let coll = self.collection(collection);
        let mut docs = coll.write().map_err(|_| poisoned(collection))?;

        let Some(current) = docs.get(id) else {
            return Ok(false);
        };
        if !guard.matches(current) {
            return Ok(false);
        }

        let mut updated = current.clone();
        for (key, value) in set {
            if key == ID_FIELD {
                continue;
            }
            updated.insert(key, value);
        }
        self.check_unique(collection, &docs, id, &updated)?;

        docs.insert(id.to_string(), updated);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        store
            .insert("things", doc(json!({ "id": "a", "n": 1 })))
            .await
            .unwrap();

        let found = store.get("things", "a").await.unwrap().unwrap();
        assert_eq!(found["n"], 1);
        assert!(store.get("things", "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let store = MemoryStore::new();
        store.insert("things", doc(json!({ "id": "a" }))).await.unwrap();
        let err = store.insert("things", doc(json!({ "id": "a" }))).await.unwrap_err();
        assert!(matches!(err, CodexError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unique_field_enforced_on_update() {
        let store = MemoryStore::new().with_unique("users", "username");
        store
            .insert("users", doc(json!({ "id": "1", "username": "alice" })))
            .await
            .unwrap();
        store
            .insert("users", doc(json!({ "id": "2", "username": "bob" })))
            .await
            .unwrap();

        let err = store
            .update_if("users", "2", &Filter::new(), doc(json!({ "username": "alice" })))
            .await
            .unwrap_err();
        assert!(matches!(err, CodexError::Conflict(_)));

        // Re-setting your own value is not a conflict
        assert!(store
            .update_if("users", "1", &Filter::new(), doc(json!({ "username": "alice" })))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_if_respects_guard() {
        let store = MemoryStore::new();
        store
            .insert("c", doc(json!({ "id": "x", "status": "pending" })))
            .await
            .unwrap();

        let guard = Filter::new().eq("status", "pending");
        assert!(store
            .update_if("c", "x", &guard, doc(json!({ "status": "approved" })))
            .await
            .unwrap());
        assert!(!store
            .update_if("c", "x", &guard, doc(json!({ "status": "rejected" })))
            .await
            .unwrap());

        let current = store.get("c", "x").await.unwrap().unwrap();
        assert_eq!(current["status"], "approved");
    }

    #[tokio::test]
    async fn test_concurrent_guarded_updates_single_winner() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("c", doc(json!({ "id": "x", "status": "pending" })))
            .await
            .unwrap();

        let wins = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let wins = Arc::clone(&wins);
            handles.push(tokio::spawn(async move {
                let guard = Filter::new().eq("status", "pending");
                if store
                    .update_if("c", "x", &guard, doc(json!({ "status": "approved" })))
                    .await
                    .unwrap()
                {
                    wins.fetch_add(1, AtomicOrdering::SeqCst);
                }
            }));
        }
        for handle in futures::future::join_all(handles).await {
            handle.unwrap();
        }

        assert_eq!(wins.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_find_sorts_and_paginates() {
        let store = MemoryStore::new();
        for (id, n) in [("a", 3), ("b", 1), ("c", 2)] {
            store
                .insert("nums", doc(json!({ "id": id, "n": n })))
                .await
                .unwrap();
        }

        let opts = FindOptions::page(1, 2).sorted_by("n", true);
        let page = store.find("nums", &Filter::new(), &opts).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        assert_eq!(store.count("nums", &Filter::new()).await.unwrap(), 3);
    }
}
