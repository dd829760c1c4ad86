//! Shared cache of search results and vector artifacts.
//!
//! Writers replace a whole entry per key; a concurrent reader observes either the previous
//! complete value or the new one. Handles are passed explicitly as `Arc<dyn CacheStore>` so the
//! dispatcher and the sync coordinator can share one namespace without a process-wide singleton.

pub mod key;
mod memory;
pub mod rate_limit;

use crate::search::SearchResults;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub use key::{CacheKey, generate as generate_key};
pub use memory::{MemoryCache, MemoryCacheSettings};
pub use rate_limit::{RateLimitStats, RateLimiter, WindowRateLimiter};

/// Operation name for cached search result sets.
pub const SEARCH_OPERATION: &str = "search";
/// Operation name for cached document vectors written by sync runs.
pub const DOCUMENT_VECTOR_OPERATION: &str = "document_vector";
/// Operation name for cached query vectors.
pub const QUERY_VECTOR_OPERATION: &str = "query_vector";

/// Errors raised by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend could not be reached or refused the operation.
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Value stored under a cache key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CachedArtifact {
    /// Result set of a search call.
    Search(SearchResults),
    /// Embedding vector for a document or query text.
    Vector(Vec<f32>),
}

impl CachedArtifact {
    /// Borrow the search results when this artifact holds them.
    pub fn as_search(&self) -> Option<&SearchResults> {
        match self {
            CachedArtifact::Search(results) => Some(results),
            CachedArtifact::Vector(_) => None,
        }
    }

    /// Borrow the vector when this artifact holds one.
    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            CachedArtifact::Vector(vector) => Some(vector),
            CachedArtifact::Search(_) => None,
        }
    }
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of lookups that returned a value.
    pub hits: u64,
    /// Number of lookups that found nothing (or an expired entry).
    pub misses: u64,
    /// Number of entries removed by capacity pressure or expiry.
    pub evictions: u64,
    /// Entries currently stored.
    pub entries: u64,
}

/// Monotonic counter advanced whenever a sync run invalidates cached search results.
///
/// A search that started before an advance must not leave its result behind: the dispatcher
/// compares the generation it observed before querying with the one after its cache write and
/// evicts its own entry when they differ.
#[derive(Debug, Default)]
pub struct CacheGeneration(AtomicU64);

impl CacheGeneration {
    /// Start at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation currently in effect.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Move to the next generation, returning it.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Key/value store shared by search callers and sync runs.
///
/// Implementations must replace each key atomically: `get` never returns a value that was only
/// partly written.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up the entry stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Arc<CachedArtifact>>, CacheError>;

    /// Store `value` under `key`, replacing any previous entry in one step.
    async fn put(&self, key: &str, value: CachedArtifact) -> Result<(), CacheError>;

    /// Remove the entry stored under `key`, returning whether one existed.
    async fn evict(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every entry whose key starts with `prefix`, returning how many were removed.
    async fn evict_prefix(&self, prefix: &str) -> Result<usize, CacheError>;

    /// Current effectiveness counters.
    fn stats(&self) -> CacheStats;
}
