//! Wiring of the shared cache, collaborators, dispatcher, and coordinator.

use crate::{
    api::AppState,
    cache::{CacheGeneration, CacheStore, MemoryCache, RateLimiter, WindowRateLimiter},
    config::Config,
    embedding::{VectorizationError, get_vectorizer},
    qdrant::{QdrantError, QdrantIndex},
    search::{SearchDispatcher, SearchIndex, SearchSettings},
    sync::{FileSystemSource, SyncCoordinator, SyncSettings},
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while assembling the runtime components.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Search index could not be prepared.
    #[error("Failed to prepare search index: {0}")]
    Index(#[from] QdrantError),
    /// Vectorizer could not be constructed.
    #[error("Failed to initialize vectorizer: {0}")]
    Vectorizer(#[from] VectorizationError),
}

/// Long-lived components shared by the HTTP server and the sync runner.
pub struct Components {
    /// Shared cache.
    pub cache: Arc<dyn CacheStore>,
    /// Cache-first search entry point.
    pub dispatcher: Arc<SearchDispatcher>,
    /// Synchronization run driver.
    pub coordinator: Arc<SyncCoordinator>,
    /// Admission control for search requests.
    pub limiter: Arc<dyn RateLimiter>,
}

impl Components {
    /// Connect to the configured collaborators and build every component over one shared cache.
    pub async fn build(config: &Config) -> Result<Self, RuntimeError> {
        tracing::info!("Initializing vectorizer");
        let vectorizer = get_vectorizer(config)?;
        let index: Arc<dyn SearchIndex> = Arc::new(QdrantIndex::connect(config).await?);
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::from_config(config));
        let generation = Arc::new(CacheGeneration::new());

        let dispatcher = SearchDispatcher::new(
            cache.clone(),
            index.clone(),
            vectorizer.clone(),
            generation.clone(),
            SearchSettings::from_config(config),
        );
        let coordinator = SyncCoordinator::new(
            Arc::new(FileSystemSource::new(config.documents_root.clone())),
            vectorizer,
            index,
            cache.clone(),
            generation,
            SyncSettings::from_config(config),
        );
        let limiter = WindowRateLimiter::new(
            config.rate_limit_per_window,
            Duration::from_secs(config.rate_limit_window_secs.max(1)),
        );
        tracing::info!(
            documents_root = %config.documents_root.display(),
            "Runtime components ready"
        );

        Ok(Self {
            cache,
            dispatcher: Arc::new(dispatcher),
            coordinator: Arc::new(coordinator),
            limiter: Arc::new(limiter),
        })
    }

    /// State for the HTTP router.
    pub fn app_state(&self, config: &Config) -> AppState {
        AppState {
            dispatcher: self.dispatcher.clone(),
            coordinator: self.coordinator.clone(),
            cache: self.cache.clone(),
            limiter: self.limiter.clone(),
            default_limit: config.search_default_limit,
        }
    }
}
