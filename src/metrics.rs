use crate::search::SearchMode;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct ModeCounters {
    searches: AtomicU64,
    errors: AtomicU64,
}

/// Thread-safe counters describing search traffic.
#[derive(Default)]
pub struct SearchMetrics {
    keyword: ModeCounters,
    vector: ModeCounters,
    hybrid: ModeCounters,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl SearchMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, mode: SearchMode) -> &ModeCounters {
        match mode {
            SearchMode::Keyword => &self.keyword,
            SearchMode::Vector => &self.vector,
            SearchMode::Hybrid => &self.hybrid,
        }
    }

    /// Record a search request for `mode`, served from cache or not.
    pub fn record_search(&self, mode: SearchMode, cache_hit: bool) {
        self.counters(mode).searches.fetch_add(1, Ordering::Relaxed);
        let counter = if cache_hit {
            &self.cache_hits
        } else {
            &self.cache_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed search for `mode`.
    pub fn record_error(&self, mode: SearchMode) {
        self.counters(mode).errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counters: &ModeCounters| ModeSnapshot {
            searches: counters.searches.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
        };
        MetricsSnapshot {
            keyword: load(&self.keyword),
            vector: load(&self.vector),
            hybrid: load(&self.hybrid),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

/// Per-mode counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ModeSnapshot {
    /// Requests received for the mode.
    pub searches: u64,
    /// Requests that failed.
    pub errors: u64,
}

/// Immutable view of search counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Keyword-mode counters.
    pub keyword: ModeSnapshot,
    /// Vector-mode counters.
    pub vector: ModeSnapshot,
    /// Hybrid-mode counters.
    pub hybrid: ModeSnapshot,
    /// Requests answered from the cache.
    pub cache_hits: u64,
    /// Requests that reached the search collaborators.
    pub cache_misses: u64,
}
