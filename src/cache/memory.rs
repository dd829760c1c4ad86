//! In-process cache backend.

use super::{CacheError, CacheStats, CacheStore, CachedArtifact};
use async_trait::async_trait;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Capacity and lifetime limits for [`MemoryCache`].
#[derive(Debug, Clone, Copy)]
pub struct MemoryCacheSettings {
    /// Maximum number of stored entries; the least recently used entry is evicted first.
    pub max_entries: u64,
    /// Lifetime of an entry after its last write; `None` keeps entries until evicted.
    pub ttl: Option<Duration>,
}

impl Default for MemoryCacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Some(Duration::from_secs(3600)),
        }
    }
}

/// `moka` backed store holding `Arc` values.
///
/// A put swaps the `Arc` stored for its key, so readers get either the previous or the new
/// value and never an intermediate state.
pub struct MemoryCache {
    entries: Cache<String, Arc<CachedArtifact>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl MemoryCache {
    /// Create an empty cache with the given limits.
    pub fn new(settings: MemoryCacheSettings) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&evictions);
        let mut builder = Cache::<String, Arc<CachedArtifact>>::builder()
            .max_capacity(settings.max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .support_invalidation_closures()
            .eviction_listener(
                move |key: Arc<String>, _value: Arc<CachedArtifact>, cause: RemovalCause| {
                    if cause.was_evicted() {
                        counter.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(key = %key, cause = ?cause, "Cache entry evicted");
                    }
                },
            );
        if let Some(ttl) = settings.ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            entries: builder.build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions,
        }
    }

    /// Build a cache from the loaded configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        let ttl = (config.cache_ttl_secs > 0).then(|| Duration::from_secs(config.cache_ttl_secs));
        Self::new(MemoryCacheSettings {
            max_entries: config.cache_max_entries.max(1) as u64,
            ttl,
        })
    }

    /// Apply pending capacity and expiry evictions now instead of on a later access.
    pub async fn run_maintenance(&self) {
        self.entries.run_pending_tasks().await;
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheSettings::default())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Arc<CachedArtifact>>, CacheError> {
        let value = self.entries.get(key).await;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn put(&self, key: &str, value: CachedArtifact) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), Arc::new(value)).await;
        Ok(())
    }

    async fn evict(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).await.is_some())
    }

    async fn evict_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let matching = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .count();
        let prefix = prefix.to_string();
        self.entries
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
            .map_err(|error| CacheError::Unavailable(error.to_string()))?;
        Ok(matching)
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.iter().count() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchHit, SearchMode, SearchResults};

    fn results(ids: &[&str]) -> CachedArtifact {
        CachedArtifact::Search(SearchResults {
            mode: SearchMode::Keyword,
            hits: ids
                .iter()
                .map(|id| SearchHit {
                    id: (*id).to_string(),
                    score: 1.0,
                    text: Some(format!("text for {id}")),
                    source_uri: None,
                })
                .collect(),
        })
    }

    #[tokio::test]
    async fn put_then_get_returns_value_and_counts_hits() {
        let cache = MemoryCache::default();
        assert!(cache.get("search:a").await.expect("get").is_none());

        cache.put("search:a", results(&["1"])).await.expect("put");
        let value = cache.get("search:a").await.expect("get").expect("hit");
        assert_eq!(value.as_search().map(|r| r.hits.len()), Some(1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        let cache = MemoryCache::default();
        cache.put("k", CachedArtifact::Vector(vec![1.0])).await.expect("put");
        cache.put("k", CachedArtifact::Vector(vec![2.0, 3.0])).await.expect("put");
        let value = cache.get("k").await.expect("get").expect("hit");
        assert_eq!(value.as_vector(), Some(&[2.0, 3.0][..]));
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = MemoryCache::new(MemoryCacheSettings {
            max_entries: 8,
            ttl: Some(Duration::from_millis(20)),
        });
        cache.put("k", CachedArtifact::Vector(vec![1.0])).await.expect("put");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("k").await.expect("get").is_none());

        cache.run_maintenance().await;
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn capacity_is_enforced_by_evicting_entries() {
        let cache = MemoryCache::new(MemoryCacheSettings {
            max_entries: 2,
            ttl: None,
        });
        for key in ["a", "b", "c"] {
            cache
                .put(key, CachedArtifact::Vector(vec![1.0]))
                .await
                .expect("put");
            cache.run_maintenance().await;
        }

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.evictions, 1);
        assert!(cache.get("a").await.expect("get").is_none());
        assert!(cache.get("c").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn evict_prefix_only_touches_matching_keys() {
        let cache = MemoryCache::default();
        cache.put("search:a", results(&["1"])).await.expect("put");
        cache.put("search:b", results(&["2"])).await.expect("put");
        cache.put("vectorize:a", CachedArtifact::Vector(vec![0.5])).await.expect("put");

        let removed = cache.evict_prefix("search:").await.expect("evict");
        assert_eq!(removed, 2);
        assert!(cache.get("search:a").await.expect("get").is_none());
        assert!(cache.get("search:b").await.expect("get").is_none());
        assert!(cache.get("vectorize:a").await.expect("get").is_some());

        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.put("search:a", results(&["3"])).await.expect("put");
        assert!(cache.get("search:a").await.expect("get").is_some());
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_never_observe_partial_writes() {
        let cache = Arc::new(MemoryCache::default());
        let old = results(&["old-1", "old-2", "old-3"]);
        let new = results(&["new-1", "new-2", "new-3", "new-4"]);
        cache.put("search:shared", old.clone()).await.expect("put");

        let writer = {
            let cache = Arc::clone(&cache);
            let (old, new) = (old.clone(), new.clone());
            tokio::spawn(async move {
                for round in 0..500 {
                    let value = if round % 2 == 0 { new.clone() } else { old.clone() };
                    cache.put("search:shared", value).await.expect("put");
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            let (old, new) = (old.clone(), new.clone());
            readers.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let value = cache
                        .get("search:shared")
                        .await
                        .expect("get")
                        .expect("entry always present");
                    assert!(*value == old || *value == new, "torn read: {value:?}");
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.expect("writer");
        for reader in readers {
            reader.await.expect("reader");
        }
    }
}
