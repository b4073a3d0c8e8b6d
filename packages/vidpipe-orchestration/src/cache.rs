use crate::error::{PipelineError, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::debug;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    /// Recency sequence number; also the entry's slot in `recency`.
    seq: u64,
}

struct Inner<V> {
    map: HashMap<String, Entry<V>>,
    /// Recency index: lowest sequence = least recently used.
    recency: BTreeMap<u64, String>,
    next_seq: u64,
    hits: u64,
    misses: u64,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hit percentage over all `get` calls, 0.0 when none were made.
    pub hit_rate: f64,
    pub total_requests: u64,
}

/// Bounded LRU cache with optional time-to-live.
///
/// Ordering follows the last successful `get` or `set`. Expiry is lazy:
/// an expired entry is only discovered (and evicted) by the `get` that
/// would have returned it. Every operation is atomic under one mutex and
/// performs no I/O while holding it.
pub struct LruCache<V> {
    max_size: usize,
    ttl: Option<Duration>,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> LruCache<V> {
    pub fn new(max_size: usize) -> Result<Self> {
        Self::with_ttl(max_size, None)
    }

    pub fn with_ttl(max_size: usize, ttl: Option<Duration>) -> Result<Self> {
        if max_size == 0 {
            return Err(PipelineError::Cache(
                "max_size must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            max_size,
            ttl,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                recency: BTreeMap::new(),
                next_seq: 0,
                hits: 0,
                misses: 0,
            }),
        })
    }

    fn is_expired(&self, inserted_at: Instant) -> bool {
        match self.ttl {
            Some(ttl) => inserted_at.elapsed() > ttl,
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let (old_seq, expired) = match inner.map.get(key) {
            None => {
                inner.misses += 1;
                debug!(key, "cache miss");
                return None;
            }
            Some(entry) => (entry.seq, self.is_expired(entry.inserted_at)),
        };

        if expired {
            inner.map.remove(key);
            inner.recency.remove(&old_seq);
            inner.misses += 1;
            debug!(key, "cache entry expired");
            return None;
        }

        // Promote to most recently used.
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.recency.remove(&old_seq);
        inner.recency.insert(seq, key.to_string());

        let entry = inner.map.get_mut(key).expect("entry checked above");
        entry.seq = seq;
        let value = entry.value.clone();

        inner.hits += 1;
        debug!(key, "cache hit");
        Some(value)
    }

    pub fn set(&self, key: &str, value: V) {
        let mut inner = self.inner.lock();

        if let Some(old) = inner.map.remove(key) {
            inner.recency.remove(&old.seq);
        }

        // At capacity: evict the least recently used entry.
        if inner.map.len() >= self.max_size {
            let lru = inner
                .recency
                .iter()
                .next()
                .map(|(&seq, key)| (seq, key.clone()));
            if let Some((lru_seq, lru_key)) = lru {
                inner.recency.remove(&lru_seq);
                inner.map.remove(&lru_key);
                debug!(key = %lru_key, "evicted LRU entry");
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.recency.insert(seq, key.to_string());
        inner.map.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );
        debug!(key, "cache set");
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.map.remove(key) {
            Some(entry) => {
                inner.recency.remove(&entry.seq);
                debug!(key, "cache delete");
                true
            }
            None => false,
        }
    }

    /// Drop all entries and reset the hit/miss statistics.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.recency.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Presence check. Does not touch recency or statistics.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().map.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let total = inner.hits + inner.misses;
        let hit_rate = if total > 0 {
            inner.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        CacheStats {
            size: inner.map.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate,
            total_requests: total,
        }
    }
}
