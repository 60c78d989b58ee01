//! Canonical entity records
//!
//! Records are stored one collection per [`EntityKind`] with a `version`
//! stamp that every write bumps. Corrections are merged with
//! [`EntityRepository::write_if_version`] so a concurrent writer is detected
//! rather than overwritten.

use serde_json::Value;
use std::sync::Arc;

use crate::db::{Document, DocumentStore, Filter, FindOptions};
use crate::schema::{CorrectableEntity, EntityKind, EntitySchema};
use crate::types::{CodexError, Result};

/// Field holding the optimistic-concurrency stamp
pub const VERSION_FIELD: &str = "version";

/// A page of records plus the total match count
#[derive(Debug, Clone)]
pub struct EntityPage {
    pub records: Vec<Document>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Clone)]
pub struct EntityRepository {
    db: Arc<dyn DocumentStore>,
}

impl EntityRepository {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Document>> {
        self.db.get(kind.collection(), id).await
    }

    /// Typed view of a record
    pub async fn get_typed<T: CorrectableEntity>(&self, id: &str) -> Result<Option<T>> {
        match self.get(T::KIND, id).await? {
            Some(record) => Ok(Some(T::from_record(record)?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self, kind: EntityKind, page: u32, limit: u32) -> Result<EntityPage> {
        let options = FindOptions::page(page, limit).sorted_by("id", false);
        let filter = Filter::new();
        let records = self.db.find(kind.collection(), &filter, &options).await?;
        let total = self.db.count(kind.collection(), &filter).await?;

        Ok(EntityPage {
            records,
            total,
            page: page.max(1),
            limit: options.limit as u32,
        })
    }

    /// Insert a typed record at version 1
    pub async fn insert<T: CorrectableEntity>(&self, entity: &T) -> Result<()> {
        let record = entity.to_record()?;
        self.insert_record(T::KIND, record).await
    }

    /// Insert an untyped record at version 1
    pub async fn insert_record(&self, kind: EntityKind, mut record: Document) -> Result<()> {
        match record.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => {}
            _ => return Err(CodexError::invalid("id", "is required")),
        }
        record.insert(VERSION_FIELD.to_string(), Value::from(1));
        record.insert(
            "updated_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        self.db.insert(kind.collection(), record).await
    }

    /// Atomically `$set` fields if the record is still at `version`.
    /// Bumps the version; returns false when another write got there first.
    pub async fn write_if_version(
        &self,
        kind: EntityKind,
        id: &str,
        version: i64,
        mut set: Document,
    ) -> Result<bool> {
        set.insert(VERSION_FIELD.to_string(), Value::from(version + 1));
        let guard = Filter::new().eq(VERSION_FIELD, version);
        self.db.update_if(kind.collection(), id, &guard, set).await
    }
}

/// Version stamp of a stored record
pub fn record_version(record: &Document) -> Result<i64> {
    record
        .get(VERSION_FIELD)
        .and_then(Value::as_i64)
        .ok_or_else(|| CodexError::Database("Record has no version stamp".into()))
}

/// Only the schema's fields of a record, as shown to correction forms
pub fn schema_fields(schema: &EntitySchema, record: &Document) -> Document {
    schema
        .field_names()
        .filter_map(|name| record.get(name).map(|v| (name.to_string(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::schema::Item;

    fn item() -> Item {
        Item {
            id: "gpu".into(),
            name: "Graphics card".into(),
            short_name: Some("GPU".into()),
            category: "barter".into(),
            base_price: 250_000,
            weight: 0.6,
            width: 2,
            height: 1,
            quest_item: false,
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_insert_sets_version() {
        let repo = EntityRepository::new(Arc::new(MemoryStore::new()));
        repo.insert(&item()).await.unwrap();

        let record = repo.get(EntityKind::Item, "gpu").await.unwrap().unwrap();
        assert_eq!(record_version(&record).unwrap(), 1);
        assert_eq!(repo.get_typed::<Item>("gpu").await.unwrap(), Some(item()));
    }

    #[tokio::test]
    async fn test_write_if_version_detects_stale_writer() {
        let repo = EntityRepository::new(Arc::new(MemoryStore::new()));
        repo.insert(&item()).await.unwrap();

        let mut set = Document::new();
        set.insert("base_price".into(), Value::from(300_000));
        assert!(repo
            .write_if_version(EntityKind::Item, "gpu", 1, set.clone())
            .await
            .unwrap());
        assert!(!repo
            .write_if_version(EntityKind::Item, "gpu", 1, set)
            .await
            .unwrap());

        let record = repo.get(EntityKind::Item, "gpu").await.unwrap().unwrap();
        assert_eq!(record_version(&record).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_pages() {
        let repo = EntityRepository::new(Arc::new(MemoryStore::new()));
        for id in ["a", "b", "c"] {
            let mut entity = item();
            entity.id = id.into();
            repo.insert(&entity).await.unwrap();
        }

        let page = repo.list(EntityKind::Item, 2, 2).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0]["id"], "c");
    }

    #[test]
    fn test_schema_fields_strips_bookkeeping() {
        let mut record = item().to_record().unwrap();
        record.insert("version".into(), Value::from(4));
        let fields = schema_fields(&Item::schema(), &record);
        assert!(!fields.contains_key("version"));
        assert!(!fields.contains_key("id"));
        assert_eq!(fields["name"], "Graphics card");
    }
}
