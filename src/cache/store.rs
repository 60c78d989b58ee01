//! In-memory page cache
//!
//! Rendered JSON bodies keyed by [`PageKey`], with a TTL and an entry cap.
//! Writes that change a record invalidate the pages showing it.

use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::keys::PageKey;

/// A cached rendered page
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub body: Bytes,
    pub etag: String,
    inserted_at: Instant,
}

impl CachedPage {
    fn new(body: Bytes) -> Self {
        let hash = Sha256::digest(&body);
        Self {
            etag: format!("\"{}\"", hex::encode(&hash[..8])),
            body,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

pub struct PageCache {
    entries: DashMap<String, CachedPage>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl PageCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Fresh cached page, if any
    pub fn get(&self, key: &PageKey) -> Option<CachedPage> {
        let storage_key = key.to_storage_key();
        let cached = self.entries.get(&storage_key).map(|e| e.value().clone());
        let hit = match cached {
            Some(page) if !page.is_expired(self.ttl) => Some(page),
            Some(_) => {
                self.entries.remove(&storage_key);
                None
            }
            None => None,
        };

        match hit {
            Some(page) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(page)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a rendered page, evicting expired entries when full
    pub fn put(&self, key: &PageKey, body: Bytes) -> CachedPage {
        if self.entries.len() >= self.max_entries {
            self.cleanup();
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }

        let page = CachedPage::new(body);
        self.entries.insert(key.to_storage_key(), page.clone());
        page
    }

    pub fn invalidate(&self, key: &PageKey) {
        if self.entries.remove(&key.to_storage_key()).is_some() {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Page invalidated");
        }
    }

    /// Drop every page whose storage key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.invalidations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(prefix, removed, "Pages invalidated by prefix");
        }
        removed
    }

    /// Remove expired entries
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, page| !page.is_expired(ttl));
        before.saturating_sub(self.entries.len())
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().inserted_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), 10_000)
    }
}

/// Periodically drop expired pages
pub fn spawn_cleanup_task(cache: Arc<PageCache>, interval: Duration) -> tokio::task::JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Page cache cleanup task started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = cache.cleanup();
            if removed > 0 {
                debug!(removed, entries = cache.len(), "Page cache cleanup completed");
            }
        }
    })
}
