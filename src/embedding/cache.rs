//! Content-hash keyed embedding cache.
//!
//! The cache is advisory: a miss, an expired entry or an eviction only
//! costs another embedding call, it never changes a result. Concurrent
//! writers of the same key race and the last write wins. Locks are only
//! held for in-memory map access, never across an `.await`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::error::EmbeddingError;

use super::{Embedded, Embedder, Embedding};

/// SHA-256 of cached content, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_content(content: &str) -> Self {
        Self(hex::encode(Sha256::digest(content.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    vector: Embedding,
    created_at: Instant,
    last_accessed: Instant,
}

/// Size and lifetime limits for an [`EmbeddingCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Entries older than this are treated as misses and evicted.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl CacheConfig {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Hit/miss counters for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries_added: u64,
    pub entries_evicted: u64,
    /// Embedding spend avoided by hits, in the embedder's cost unit.
    pub cost_saved: f64,
}

impl CacheStats {
    /// Hit rate in [0, 1], 0 when nothing was looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-process map from content hash to embedding vector.
///
/// LRU eviction once `max_entries` is reached, plus TTL expiry.
pub struct EmbeddingCache {
    entries: RwLock<HashMap<ContentHash, CacheEntry>>,
    /// Last known cost of computing each entry, credited on hits.
    costs: RwLock<HashMap<ContentHash, f64>>,
    config: CacheConfig,
    stats: RwLock<CacheStats>,
}

impl EmbeddingCache {
    pub fn new(max_entries: usize) -> Self {
        Self::with_config(CacheConfig::new(max_entries))
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            costs: RwLock::new(HashMap::new()),
            config,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Looks up a vector, counting the access as a hit or a miss.
    pub fn get(&self, hash: &ContentHash) -> Option<Embedding> {
        let found = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            match entries.get_mut(hash) {
                Some(entry) if entry.created_at.elapsed() < self.config.ttl => {
                    entry.last_accessed = Instant::now();
                    Some(entry.vector.clone())
                }
                _ => None,
            }
        };

        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        if found.is_some() {
            stats.hits += 1;
            let costs = self.costs.read().unwrap_or_else(PoisonError::into_inner);
            stats.cost_saved += costs.get(hash).copied().unwrap_or(0.0);
        } else {
            stats.misses += 1;
        }
        found
    }

    /// Stores a vector, replacing whatever a concurrent writer put there.
    pub fn insert(&self, hash: ContentHash, vector: Embedding, cost: f64) {
        let evicted = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let mut evicted = self.evict_expired(&mut entries);
            if !entries.contains_key(&hash) && entries.len() >= self.config.max_entries {
                evicted += self.evict_oldest(&mut entries);
            }

            let now = Instant::now();
            entries.insert(
                hash.clone(),
                CacheEntry {
                    vector,
                    created_at: now,
                    last_accessed: now,
                },
            );
            evicted
        };

        self.costs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash, cost);

        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        stats.entries_added += 1;
        stats.entries_evicted += evicted;
    }

    fn evict_oldest(&self, entries: &mut HashMap<ContentHash, CacheEntry>) -> u64 {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(hash, _)| hash.clone());

        match oldest {
            Some(hash) => {
                entries.remove(&hash);
                self.costs
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&hash);
                1
            }
            None => 0,
        }
    }

    fn evict_expired(&self, entries: &mut HashMap<ContentHash, CacheEntry>) -> u64 {
        let ttl = self.config.ttl;
        let before = entries.len();
        entries.retain(|_, entry| entry.created_at.elapsed() < ttl);
        (before - entries.len()) as u64
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.costs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Embedder decorator that serves repeated texts from an [`EmbeddingCache`].
///
/// Cache hits report a cost of 0.
pub struct CachedEmbedder<E> {
    inner: E,
    cache: EmbeddingCache,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E, max_entries: usize) -> Self {
        Self::with_cache(inner, EmbeddingCache::new(max_entries))
    }

    pub fn with_cache(inner: E, cache: EmbeddingCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Embedded, EmbeddingError> {
        let hash = ContentHash::from_content(text);
        if let Some(vector) = self.cache.get(&hash) {
            tracing::debug!(hash = %hash, "Embedding cache hit");
            return Ok(Embedded { vector, cost: 0.0 });
        }

        let embedded = self.inner.embed(text).await?;
        self.cache
            .insert(hash, embedded.vector.clone(), embedded.cost);
        Ok(embedded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embedder that charges 1.0 per call and counts calls.
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, text: &str) -> Result<Embedded, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Embedded {
                vector: Array1::from_vec(vec![text.len() as f64, 1.0]),
                cost: 1.0,
            })
        }
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = ContentHash::from_content("hello");
        let b = ContentHash::from_content("hello");
        let c = ContentHash::from_content("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_cache_hit_and_miss_stats() {
        let cache = EmbeddingCache::new(10);
        let hash = ContentHash::from_content("prompt");
        assert!(cache.get(&hash).is_none());

        cache.insert(hash.clone(), Array1::from_vec(vec![1.0]), 0.5);
        assert!(cache.get(&hash).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-10);
        assert!((stats.cost_saved - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(2);
        let a = ContentHash::from_content("a");
        let b = ContentHash::from_content("b");
        let c = ContentHash::from_content("c");

        cache.insert(a.clone(), Array1::from_vec(vec![1.0]), 0.0);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(b.clone(), Array1::from_vec(vec![2.0]), 0.0);
        std::thread::sleep(Duration::from_millis(2));
        // Touch `a` so `b` becomes the oldest.
        assert!(cache.get(&a).is_some());
        cache.insert(c.clone(), Array1::from_vec(vec![3.0]), 0.0);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
        assert_eq!(cache.stats().entries_evicted, 1);
    }

    #[test]
    fn test_expired_entries_are_misses() {
        let cache = EmbeddingCache::with_config(CacheConfig::new(10).with_ttl(Duration::ZERO));
        let hash = ContentHash::from_content("stale");
        cache.insert(hash.clone(), Array1::from_vec(vec![1.0]), 0.0);
        assert!(cache.get(&hash).is_none());
    }

    #[test]
    fn test_insert_is_last_write_wins() {
        let cache = EmbeddingCache::new(10);
        let hash = ContentHash::from_content("k");
        cache.insert(hash.clone(), Array1::from_vec(vec![1.0]), 0.0);
        cache.insert(hash.clone(), Array1::from_vec(vec![2.0]), 0.0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&hash).expect("present")[0], 2.0);
    }

    #[tokio::test]
    async fn test_cached_embedder_hits_cost_nothing() {
        let embedder = CachedEmbedder::new(
            CountingEmbedder {
                calls: AtomicUsize::new(0),
            },
            10,
        );

        let first = embedder.embed("Write code").await.expect("embed");
        let second = embedder.embed("Write code").await.expect("embed");

        assert_eq!(first.cost, 1.0);
        assert_eq!(second.cost, 0.0);
        assert_eq!(first.vector, second.vector);
        assert_eq!(embedder.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(embedder.cache().stats().hits, 1);
    }
}
