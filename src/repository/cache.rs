//! Response cache
//!
//! Maps a fingerprint to the last successful upstream payload. Freshness is
//! judged by the caller at read time; the store only keeps the newest payload
//! per fingerprint, bounded by an LRU capacity.

use std::num::NonZeroUsize;
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::models::Fingerprint;

/// Last successful payload for one fingerprint
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Bytes,
    pub captured_at: Instant,
}

impl CacheEntry {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.captured_at)
    }

    pub fn is_fresh(&self, now: Instant, window: Duration) -> bool {
        self.age(now) < window
    }
}

/// Thread-safe fingerprint -> payload store
pub struct ResponseCache {
    entries: Mutex<LruCache<Fingerprint, CacheEntry>>,
    capacity: NonZeroUsize,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
        }
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.entries.lock().get(fingerprint).cloned()
    }

    /// Overwrite the entry for a fingerprint
    pub fn put(&self, fingerprint: Fingerprint, payload: Bytes, now: Instant) {
        let entry = CacheEntry {
            payload,
            captured_at: now,
        };
        self.entries.lock().put(fingerprint, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}
