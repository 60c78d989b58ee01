//! Persistence layer
//!
//! [`DocumentStore`] is the contract; [`MongoStore`] is the production
//! implementation and [`MemoryStore`] serves dev mode and tests.

mod memory;
mod metadata;
mod mongo;
mod store;

pub use memory::MemoryStore;
pub use metadata::Metadata;
pub use mongo::{filter_to_bson, IntoIndexes, MongoClient, MongoStore};
pub use store::{
    from_document, lookup_path, to_document, Document, DocumentStore, Filter, FindOptions, Predicate,
    ID_FIELD,
};

/// Collection of proposed corrections
pub const CORRECTION_COLLECTION: &str = "corrections";

/// Collection of user accounts
pub const USER_COLLECTION: &str = "users";

/// Memory store with the same unique fields MongoDB enforces by index
pub fn memory_store() -> MemoryStore {
    MemoryStore::new()
        .with_unique(USER_COLLECTION, "username")
        .with_unique(USER_COLLECTION, "email")
}
