//! Rendered page cache

pub mod keys;
pub mod store;

pub use keys::PageKey;
pub use store::{spawn_cleanup_task, CacheStats, CachedPage, PageCache};
