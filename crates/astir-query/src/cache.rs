//! Two-tier query caching: response cache and embedding cache.
//!
//! Both tiers share one policy engine, [`TtlLruCache`]: bounded capacity with
//! LRU eviction on insert, plus a TTL checked on read and swept opportunistically
//! on write. Thread-safe via interior mutability (`parking_lot::Mutex`), so
//! handles clone cheaply behind an `Arc`.
//!
//! The response cache is epoch-aware: an entry stored against an older corpus
//! epoch is a miss and is removed on contact, and hot reload purges the whole
//! generation eagerly. The embedding cache is keyed by normalised query text
//! only, so reloads leave it intact.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::request::QueryResponse;

/// Cache metrics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheMetrics {
    /// Reads answered from the cache
    pub hits: u64,
    /// Reads that found nothing usable
    pub misses: u64,
    /// Entries pushed out by capacity
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
}

impl CacheMetrics {
    /// Hit rate in [0.0, 1.0]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct TimedEntry<V> {
    value: V,
    inserted_at: Instant,
    last_used_at: Instant,
}

struct CacheState<K: Hash + Eq, V> {
    lru: LruCache<K, TimedEntry<V>>,
    metrics: CacheMetrics,
}

/// Bounded TTL + LRU cache with interior mutability.
pub struct TtlLruCache<K: Hash + Eq, V> {
    ttl: Duration,
    state: Mutex<CacheState<K, V>>,
}

impl<K: Hash + Eq, V: Clone> TtlLruCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            state: Mutex::new(CacheState {
                lru: LruCache::new(capacity),
                metrics: CacheMetrics::default(),
            }),
        }
    }

    /// Look up a key, refreshing its LRU position. Expired entries are
    /// removed and reported as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        let expired = match state.lru.get_mut(key) {
            Some(entry) => {
                if now.duration_since(entry.inserted_at) <= self.ttl {
                    entry.last_used_at = now;
                    state.metrics.hits += 1;
                    return Some(entry.value.clone());
                }
                true
            }
            None => false,
        };

        if expired {
            state.lru.pop(key);
            state.metrics.expirations += 1;
        }
        state.metrics.misses += 1;
        None
    }

    /// Insert a value, sweeping expired entries first so TTL victims go
    /// before LRU victims when the cache is full.
    pub fn put(&self, key: K, value: V) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        // TTL sweep from the cold end; stops at the first live entry.
        let before = state.lru.len();
        loop {
            let expired = match state.lru.peek_lru() {
                Some((_, entry)) => now.duration_since(entry.inserted_at) > self.ttl,
                None => false,
            };
            if !expired {
                break;
            }
            state.lru.pop_lru();
        }
        state.metrics.expirations += (before - state.lru.len()) as u64;

        if state.lru.len() == usize::from(state.lru.cap()) && !state.lru.contains(&key) {
            state.metrics.evictions += 1;
        }
        state.lru.put(
            key,
            TimedEntry {
                value,
                inserted_at: now,
                last_used_at: now,
            },
        );
    }

    /// Remove a single key.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.state.lock().lru.pop(key).map(|e| e.value)
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.state.lock().lru.clear();
    }

    /// Keep only entries the predicate accepts.
    pub fn retain<F: Fn(&V) -> bool>(&self, keep: F)
    where
        K: Clone,
    {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let doomed: Vec<K> = state
            .lru
            .iter()
            .filter(|(_, entry)| !keep(&entry.value))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            state.lru.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().lru.is_empty()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().metrics
    }
}

/// Response cache payload: the response plus the epoch it was computed at.
#[derive(Clone)]
struct EpochPayload {
    epoch: u64,
    response: QueryResponse,
}

/// Query-response cache keyed by request fingerprint.
pub struct QueryCache {
    inner: TtlLruCache<String, EpochPayload>,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: TtlLruCache::new(capacity, ttl),
        }
    }

    /// A hit requires the stored epoch to still be current; stale entries are
    /// removed and treated as misses.
    pub fn get(&self, fingerprint: &str, current_epoch: u64) -> Option<QueryResponse> {
        let payload = self.inner.get(&fingerprint.to_string())?;
        if payload.epoch == current_epoch {
            Some(payload.response)
        } else {
            self.inner.remove(&fingerprint.to_string());
            None
        }
    }

    pub fn put(&self, fingerprint: String, epoch: u64, response: QueryResponse) {
        self.inner.put(fingerprint, EpochPayload { epoch, response });
    }

    /// Drop every entry computed before the given epoch.
    pub fn purge_epoch_before(&self, epoch: u64) {
        self.inner.retain(|payload| payload.epoch >= epoch);
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.inner.metrics()
    }
}

/// Embedding cache keyed by normalised query text.
pub struct EmbeddingCache {
    inner: TtlLruCache<String, Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: TtlLruCache::new(capacity, ttl),
        }
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.inner.get(&text.to_string())
    }

    pub fn put(&self, text: String, vector: Vec<f32>) {
        self.inner.put(text, vector);
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.inner.metrics()
    }
}

/// Sizing for both tiers.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub query_capacity: usize,
    pub query_ttl_secs: u64,
    pub embedding_capacity: usize,
    pub embedding_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            query_capacity: 512,
            query_ttl_secs: 300,
            embedding_capacity: 2048,
            embedding_ttl_secs: 3600,
        }
    }
}

/// Both cache tiers, shared by the processor and the reload coordinator.
pub struct QueryCaches {
    pub query: QueryCache,
    pub embedding: EmbeddingCache,
}

impl QueryCaches {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            query: QueryCache::new(
                config.query_capacity,
                Duration::from_secs(config.query_ttl_secs),
            ),
            embedding: EmbeddingCache::new(
                config.embedding_capacity,
                Duration::from_secs(config.embedding_ttl_secs),
            ),
        }
    }
}

impl Default for QueryCaches {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ResponseMetadata, SearchStrategy};

    fn response(epoch: u64) -> QueryResponse {
        QueryResponse {
            results: vec![],
            total_matches: 0,
            query_time_ms: 1,
            search_strategy: SearchStrategy::Semantic,
            metadata: ResponseMetadata {
                vector_search_time_ms: 0,
                ranking_time_ms: 0,
                total_candidates: 0,
                applied_filters: vec![],
                cache_hit: false,
                corpus_epoch: epoch,
            },
        }
    }

    #[test]
    fn get_put_round_trip() {
        let cache: TtlLruCache<String, u32> = TtlLruCache::new(4, Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.metrics().hits, 1);
        assert_eq!(cache.metrics().misses, 1);
    }

    #[test]
    fn ttl_expiry_is_a_miss() {
        let cache: TtlLruCache<String, u32> = TtlLruCache::new(4, Duration::from_millis(0));
        cache.put("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.metrics().expirations, 1);
    }

    #[test]
    fn lru_evicts_oldest_on_capacity() {
        let cache: TtlLruCache<String, u32> = TtlLruCache::new(2, Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        // Touch "a" so "b" becomes LRU.
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        cache.put("c".to_string(), 3);
        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[test]
    fn query_cache_rejects_stale_epoch() {
        let cache = QueryCache::new(8, Duration::from_secs(60));
        cache.put("fp".to_string(), 1, response(1));
        assert!(cache.get("fp", 1).is_some());
        // Same key at a newer epoch: stale, removed.
        assert!(cache.get("fp", 2).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn purge_epoch_before_drops_old_generations() {
        let cache = QueryCache::new(8, Duration::from_secs(60));
        cache.put("old".to_string(), 1, response(1));
        cache.put("new".to_string(), 2, response(2));
        cache.purge_epoch_before(2);
        assert!(cache.get("old", 1).is_none());
        assert!(cache.get("new", 2).is_some());
    }

    #[test]
    fn embedding_cache_round_trip() {
        let cache = EmbeddingCache::new(8, Duration::from_secs(60));
        cache.put("parse json".to_string(), vec![0.1, 0.2]);
        assert_eq!(cache.get("parse json"), Some(vec![0.1, 0.2]));
        assert_eq!(cache.get("other"), None);
    }
}
