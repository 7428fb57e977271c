//! Bounded expression-result cache
//!
//! Keyed by `(expression, record identity)`. Only records that carry a version
//! marker are cached, so a key always refers to one immutable resource version.
//! A poisoned lock disables the cache for that call instead of failing.

use crate::domain::RecordIdentity;
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type CacheKey = (String, RecordIdentity);

/// Per-process LRU of evaluated path results
pub struct EvalCache {
    entries: Mutex<LruCache<CacheKey, Arc<Vec<Value>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EvalCache {
    /// Create a cache holding at most `capacity` results
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a cached result
    pub fn get(&self, expression: &str, identity: &RecordIdentity) -> Option<Arc<Vec<Value>>> {
        let key = (expression.to_string(), identity.clone());
        let found = self
            .entries
            .lock()
            .ok()
            .and_then(|mut entries| entries.get(&key).cloned());
        match found {
            Some(hit) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(hit)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result
    pub fn put(&self, expression: &str, identity: &RecordIdentity, values: Arc<Vec<Value>>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put((expression.to_string(), identity.clone()), values);
        }
    }

    /// Number of cached results
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since creation
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl std::fmt::Debug for EvalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (hits, misses) = self.stats();
        f.debug_struct("EvalCache")
            .field("len", &self.len())
            .field("hits", &hits)
            .field("misses", &misses)
            .finish()
    }
}
