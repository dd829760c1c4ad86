//! Cache-first search dispatch.

use super::{QueryCriteria, SearchHit, SearchIndex, SearchMode, SearchQuery, SearchResults};
use crate::{
    cache::{
        CacheGeneration, CacheStore, CachedArtifact, QUERY_VECTOR_OPERATION, SEARCH_OPERATION,
    },
    cache_key,
    config::Config,
    embedding::Vectorizer,
    error::{ErrorCode, SearchError},
    metrics::{MetricsSnapshot, SearchMetrics},
};
use std::collections::HashMap;
use std::sync::Arc;

/// Modes this deployment can serve beyond keyword search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchCapabilities {
    /// Vector-mode search is available.
    pub vector: bool,
    /// Hybrid-mode search is available.
    pub hybrid: bool,
}

impl Default for SearchCapabilities {
    fn default() -> Self {
        Self {
            vector: true,
            hybrid: true,
        }
    }
}

/// Tunables applied by the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    /// Enabled search modes.
    pub capabilities: SearchCapabilities,
    /// Largest accepted `limit`.
    pub max_limit: usize,
    /// Weight applied to keyword scores in hybrid mode.
    pub keyword_weight: f32,
    /// Weight applied to vector scores in hybrid mode.
    pub vector_weight: f32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            capabilities: SearchCapabilities::default(),
            max_limit: 100,
            keyword_weight: 0.6,
            vector_weight: 0.4,
        }
    }
}

impl SearchSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            capabilities: SearchCapabilities {
                vector: config.vector_search_enabled,
                hybrid: config.hybrid_search_enabled,
            },
            max_limit: config.search_max_limit.max(1),
            ..Self::default()
        }
    }
}

/// Serves searches from the shared cache, falling back to the search collaborators.
///
/// Result sets are cached under `search:<normalized query>_<mode>`. Empty result sets are
/// returned but never cached, so a document synced later shows up on the next call.
pub struct SearchDispatcher {
    cache: Arc<dyn CacheStore>,
    index: Arc<dyn SearchIndex>,
    vectorizer: Arc<dyn Vectorizer>,
    generation: Arc<CacheGeneration>,
    settings: SearchSettings,
    metrics: SearchMetrics,
}

impl SearchDispatcher {
    /// Assemble a dispatcher over explicit collaborator handles.
    pub fn new(
        cache: Arc<dyn CacheStore>,
        index: Arc<dyn SearchIndex>,
        vectorizer: Arc<dyn Vectorizer>,
        generation: Arc<CacheGeneration>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            cache,
            index,
            vectorizer,
            generation,
            settings,
            metrics: SearchMetrics::new(),
        }
    }

    /// Run `query` in `mode`, answering from the cache when possible.
    pub async fn search(
        &self,
        query: &SearchQuery,
        mode: SearchMode,
    ) -> Result<SearchResults, SearchError> {
        let outcome = self.dispatch(query, mode).await;
        if let Err(error) = &outcome {
            self.metrics.record_error(mode);
            tracing::warn!(
                mode = %mode,
                code = %error.code(),
                retryable = error.is_retryable(),
                error = %error,
                "Search failed"
            );
        }
        outcome
    }

    /// Search counters accumulated since startup.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn dispatch(
        &self,
        query: &SearchQuery,
        mode: SearchMode,
    ) -> Result<SearchResults, SearchError> {
        self.validate(query)?;

        let key = cache_key!(SEARCH_OPERATION, query.normalized_form(), mode);
        if let Some(artifact) = self.cache.get(&key).await? {
            match artifact.as_search() {
                Some(results) => {
                    self.metrics.record_search(mode, true);
                    tracing::debug!(key = %key, hits = results.total(), "Search served from cache");
                    return Ok(results.clone());
                }
                None => {
                    tracing::warn!(key = %key, "Cached artifact under search key is not a result set");
                }
            }
        }
        self.metrics.record_search(mode, false);
        self.ensure_supported(mode)?;

        let generation = self.generation.current();
        let mut hits = match mode {
            SearchMode::Keyword => self.keyword_hits(query).await?,
            SearchMode::Vector => self.vector_hits(query).await?,
            SearchMode::Hybrid => {
                let (keyword, vector) =
                    tokio::try_join!(self.keyword_hits(query), self.vector_hits(query))?;
                fuse_hybrid(keyword, vector, self.settings)
            }
        };
        if let Some(min_score) = query.min_score {
            hits.retain(|hit| hit.score >= min_score);
        }
        hits.truncate(query.limit);

        let results = SearchResults { mode, hits };
        if results.hits.is_empty() {
            tracing::debug!(key = %key, "Empty result set not cached");
            return Ok(results);
        }

        self.cache
            .put(&key, CachedArtifact::Search(results.clone()))
            .await?;
        if self.generation.current() != generation {
            // A sync run invalidated search results while this query was in flight.
            self.cache.evict(&key).await?;
            tracing::debug!(key = %key, "Dropped result computed against a superseded index");
        }
        tracing::debug!(key = %key, hits = results.total(), "Search result cached");
        Ok(results)
    }

    fn validate(&self, query: &SearchQuery) -> Result<(), SearchError> {
        if query.text.trim().is_empty() {
            return Err(SearchError::invalid_request("query text must not be empty"));
        }
        if query.limit == 0 || query.limit > self.settings.max_limit {
            return Err(SearchError::invalid_request(format!(
                "limit must be between 1 and {}",
                self.settings.max_limit
            )));
        }
        if let Some(min_score) = query.min_score
            && !min_score.is_finite()
        {
            return Err(SearchError::invalid_request("min_score must be a finite number"));
        }
        Ok(())
    }

    fn ensure_supported(&self, mode: SearchMode) -> Result<(), SearchError> {
        let capabilities = self.settings.capabilities;
        match mode {
            SearchMode::Vector if !capabilities.vector => {
                Err(SearchError::new(ErrorCode::VectorSearchNotImplemented))
            }
            SearchMode::Hybrid if !capabilities.hybrid => {
                Err(SearchError::new(ErrorCode::HybridSearchNotImplemented))
            }
            _ => Ok(()),
        }
    }

    async fn keyword_hits(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SearchError> {
        let criteria = QueryCriteria::Keyword {
            text: query.text.trim().to_string(),
            limit: query.limit,
        };
        Ok(self.index.query(&criteria).await?)
    }

    async fn vector_hits(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SearchError> {
        let vector = self.query_vector(query).await?;
        let criteria = QueryCriteria::Vector {
            vector,
            limit: query.limit,
            min_score: query.min_score,
        };
        Ok(self.index.query(&criteria).await?)
    }

    async fn query_vector(&self, query: &SearchQuery) -> Result<Vec<f32>, SearchError> {
        let text = query.normalized_text();
        let key = cache_key!(QUERY_VECTOR_OPERATION, text);
        if let Some(artifact) = self.cache.get(&key).await?
            && let Some(vector) = artifact.as_vector()
        {
            return Ok(vector.to_vec());
        }

        let vector = self.vectorizer.vectorize(&text).await?;
        self.cache
            .put(&key, CachedArtifact::Vector(vector.clone()))
            .await?;
        Ok(vector)
    }
}

/// Weighted fusion: scores are scaled per source and summed per document id.
fn fuse_hybrid(
    keyword: Vec<SearchHit>,
    vector: Vec<SearchHit>,
    settings: SearchSettings,
) -> Vec<SearchHit> {
    let mut merged: HashMap<String, SearchHit> = HashMap::new();

    for mut hit in keyword {
        hit.score *= settings.keyword_weight;
        merged.insert(hit.id.clone(), hit);
    }

    for hit in vector {
        let weighted = hit.score * settings.vector_weight;
        match merged.get_mut(&hit.id) {
            Some(existing) => {
                existing.score += weighted;
                if existing.text.is_none() {
                    existing.text = hit.text;
                }
                if existing.source_uri.is_none() {
                    existing.source_uri = hit.source_uri;
                }
            }
            None => {
                merged.insert(
                    hit.id.clone(),
                    SearchHit {
                        score: weighted,
                        ..hit
                    },
                );
            }
        }
    }

    let mut hits: Vec<SearchHit> = merged.into_values().collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits
}
