//! MongoDB client and document store
//!
//! Documents are stored with `_id` equal to their `id` field. Unique indexes
//! are declared per schema through [`IntoIndexes`] and turn duplicate writes
//! into `Conflict`.

use bson::{doc, Bson, Document as BsonDocument};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, Database, IndexModel,
};
use tracing::{debug, info};

use super::store::{Document, DocumentStore, Filter, FindOptions, Predicate, ID_FIELD};
use crate::types::{CodexError, Result};

/// MongoDB duplicate key error code
const DUPLICATE_KEY: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(BsonDocument, Option<IndexOptions>)>;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| CodexError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| CodexError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    pub fn database(&self) -> Database {
        self.client.database(&self.db_name)
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// [`DocumentStore`] backed by MongoDB
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(client: &MongoClient) -> Self {
        Self {
            db: client.database(),
        }
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.db.collection::<BsonDocument>(name)
    }

    /// Apply schema-defined indexes to a collection
    pub async fn ensure_indexes<T: IntoIndexes>(&self, collection: &str) -> Result<()> {
        let schema_indices = T::into_indices();
        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();
        let count = indices.len();

        self.collection(collection)
            .create_indexes(indices)
            .await
            .map_err(|e| CodexError::Database(format!("Failed to create indexes: {}", e)))?;

        debug!(collection, count, "Indexes applied");
        Ok(())
    }
}

fn to_bson(value: &serde_json::Value) -> Result<Bson> {
    bson::to_bson(value).map_err(|e| CodexError::Database(format!("BSON encoding failed: {}", e)))
}

/// Translate a [`Filter`] into a MongoDB query document
pub fn filter_to_bson(filter: &Filter) -> Result<BsonDocument> {
    let mut clauses = Vec::with_capacity(filter.predicates().len());

    for predicate in filter.predicates() {
        let clause = match predicate {
            Predicate::Eq(field, value) => doc! { field.as_str(): to_bson(value)? },
            Predicate::Ne(field, value) => doc! { field.as_str(): { "$ne": to_bson(value)? } },
            Predicate::Search { fields, needle } => {
                let pattern = regex::escape(needle);
                let alternatives: Vec<BsonDocument> = fields
                    .iter()
                    .map(|f| doc! { f.as_str(): { "$regex": pattern.as_str(), "$options": "i" } })
                    .collect();
                doc! { "$or": alternatives }
            }
        };
        clauses.push(clause);
    }

    Ok(match clauses.len() {
        0 => BsonDocument::new(),
        1 => clauses.remove(0),
        _ => doc! { "$and": clauses },
    })
}

fn encode(doc: &Document) -> Result<BsonDocument> {
    bson::to_document(doc).map_err(|e| CodexError::Database(format!("BSON encoding failed: {}", e)))
}

fn decode(mut raw: BsonDocument) -> Result<Document> {
    raw.remove("_id");
    bson::from_document(raw).map_err(|e| CodexError::Database(format!("Malformed document: {}", e)))
}

fn map_write_error(e: mongodb::error::Error, collection: &str, action: &str) -> CodexError {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY => {
            CodexError::Conflict(format!("Duplicate key in {}: {}", collection, we.message))
        }
        _ => CodexError::Database(format!("{} failed: {}", action, e)),
    }
}

#[async_trait::async_trait]
impl DocumentStore for MongoStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let found = self
            .collection(collection)
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| CodexError::Database(format!("Find failed: {}", e)))?;

        found.map(decode).transpose()
    }

    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>> {
        let coll = self.collection(collection);
        let mut action = coll
            .find(filter_to_bson(filter)?)
            .skip(options.skip)
            .limit(options.limit as i64);

        if let Some(ref field) = options.sort_by {
            let direction = if options.descending { -1 } else { 1 };
            action = action.sort(doc! { field.as_str(): direction });
        }

        let cursor = action
            .await
            .map_err(|e| CodexError::Database(format!("Find failed: {}", e)))?;

        let raw: Vec<BsonDocument> = cursor
            .try_collect()
            .await
            .map_err(|e| CodexError::Database(format!("Cursor read failed: {}", e)))?;

        raw.into_iter().map(decode).collect()
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        self.collection(collection)
            .count_documents(filter_to_bson(filter)?)
            .await
            .map_err(|e| CodexError::Database(format!("Count failed: {}", e)))
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<()> {
        let id = doc
            .get(ID_FIELD)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CodexError::Internal("Document has no string id".into()))?
            .to_string();

        let mut raw = encode(&doc)?;
        raw.insert("_id", id);

        self.collection(collection)
            .insert_one(raw)
            .await
            .map_err(|e| map_write_error(e, collection, "Insert"))?;
        Ok(())
    }

    async fn update_if(&self, collection: &str, id: &str, guard: &Filter, mut set: Document) -> Result<bool> {
        set.remove(ID_FIELD);
        if set.is_empty() {
            return Ok(false);
        }

        let mut filter = filter_to_bson(guard)?;
        filter.insert("_id", id);

        let result = self
            .collection(collection)
            .update_one(filter, doc! { "$set": encode(&set)? })
            .await
            .map_err(|e| map_write_error(e, collection, "Update"))?;

        Ok(result.matched_count > 0)
    }
}
