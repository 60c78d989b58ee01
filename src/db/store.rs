//! Persistence contract
//!
//! A document store keyed by identifier. Everything above this layer talks
//! to [`DocumentStore`]; MongoDB and the in-memory store both implement it.
//!
//! The only write primitive besides `insert` is [`DocumentStore::update_if`],
//! an atomic `$set` guarded by equality predicates. Status transitions and
//! versioned record writes are built on it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::types::{CodexError, Result};

/// A stored document
pub type Document = serde_json::Map<String, Value>;

/// Field every stored document carries as its identifier
pub const ID_FIELD: &str = "id";

/// A single filter predicate. Field names may be dotted paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Ne(String, Value),
    /// Case-insensitive substring match on any of the fields
    Search { fields: Vec<String>, needle: String },
}

/// Conjunction of predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching one document by id
    pub fn by_id(id: &str) -> Self {
        Self::new().eq(ID_FIELD, id)
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Eq(field.to_string(), value.into()));
        self
    }

    pub fn ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Ne(field.to_string(), value.into()));
        self
    }

    pub fn search(mut self, fields: &[&str], needle: &str) -> Self {
        self.predicates.push(Predicate::Search {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            needle: needle.to_string(),
        });
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Evaluate against a document held in memory
    pub fn matches(&self, doc: &Document) -> bool {
        self.predicates.iter().all(|p| match p {
            Predicate::Eq(field, expected) => value_matches(lookup_path(doc, field), expected),
            Predicate::Ne(field, expected) => !value_matches(lookup_path(doc, field), expected),
            Predicate::Search { fields, needle } => {
                let needle = needle.to_lowercase();
                fields.iter().any(|field| {
                    matches!(lookup_path(doc, field), Some(Value::String(s)) if s.to_lowercase().contains(&needle))
                })
            }
        })
    }
}

/// Equality with MongoDB semantics: an array field matches when it equals
/// the value or contains it as an element
fn value_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(value) => value == expected,
        None => false,
    }
}

/// Resolve a dotted path inside a document
pub fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Sort order and pagination for `find`
#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions {
    pub sort_by: Option<String>,
    pub descending: bool,
    pub skip: u64,
    pub limit: u64,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            sort_by: None,
            descending: false,
            skip: 0,
            limit: 100,
        }
    }
}

impl FindOptions {
    /// 1-based page of `limit` documents
    pub fn page(page: u32, limit: u32) -> Self {
        let limit = limit.clamp(1, 100) as u64;
        Self {
            skip: (page.max(1) as u64 - 1) * limit,
            limit,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, field: &str, descending: bool) -> Self {
        self.sort_by = Some(field.to_string());
        self.descending = descending;
        self
    }
}

/// Persistence contract consumed by the core
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point lookup by id
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Documents matching a filter, sorted and paginated
    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>>;

    /// Number of documents matching a filter
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Insert a new document. `Conflict` on duplicate id or unique field.
    async fn insert(&self, collection: &str, doc: Document) -> Result<()>;

    /// Atomically `$set` top-level fields on document `id` if it still
    /// matches `guard`. Returns false when no document matched.
    /// `Conflict` when the write would violate a unique field.
    async fn update_if(&self, collection: &str, id: &str, guard: &Filter, set: Document) -> Result<bool>;

    /// Lookup by field equality
    async fn find_by_field(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>> {
        self.find(collection, &Filter::new().eq(field, value.clone()), &FindOptions::default())
            .await
    }
}

/// Serialize a typed value into a document
pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(CodexError::Internal(format!(
            "expected an object, got {}",
            value_kind(&other)
        ))),
    }
}

/// Deserialize a typed value from a document
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| CodexError::Database(format!("Malformed document: {e}")))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_eq_and_ne() {
        let d = doc(json!({ "id": "a", "status": "pending", "apply": { "state": "failed" } }));

        assert!(Filter::by_id("a").matches(&d));
        assert!(Filter::new().eq("apply.state", "failed").matches(&d));
        assert!(!Filter::new().eq("status", "approved").matches(&d));
        assert!(Filter::new().ne("id", "b").matches(&d));
        assert!(Filter::new().ne("missing", "x").matches(&d));
    }

    #[test]
    fn test_filter_eq_matches_array_elements() {
        let d = doc(json!({ "roles": ["user", "moderator"] }));
        assert!(Filter::new().eq("roles", "moderator").matches(&d));
        assert!(!Filter::new().eq("roles", "admin").matches(&d));
        assert!(Filter::new().ne("roles", "admin").matches(&d));
    }

    #[test]
    fn test_filter_search_is_case_insensitive() {
        let d = doc(json!({ "username": "AliceW", "email": "a@example.com" }));
        assert!(Filter::new().search(&["username", "email"], "alice").matches(&d));
        assert!(Filter::new().search(&["username", "email"], "EXAMPLE").matches(&d));
        assert!(!Filter::new().search(&["username"], "bob").matches(&d));
    }

    #[test]
    fn test_find_options_page() {
        let opts = FindOptions::page(3, 20);
        assert_eq!(opts.skip, 40);
        assert_eq!(opts.limit, 20);

        let opts = FindOptions::page(0, 500);
        assert_eq!(opts.skip, 0);
        assert_eq!(opts.limit, 100);
    }

    #[test]
    fn test_to_document_rejects_scalars() {
        assert!(to_document(&5).is_err());
        assert!(to_document(&json!({ "a": 1 })).is_ok());
    }
}
