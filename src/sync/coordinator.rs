use super::{DocumentSource, ItemRef, SyncError, SyncState, SyncStatus, SyncStatusTracker};
use crate::{
    cache::{
        CacheGeneration, CacheStore, CachedArtifact, DOCUMENT_VECTOR_OPERATION, SEARCH_OPERATION,
    },
    cache_key,
    config::Config,
    embedding::Vectorizer,
    search::{IndexedDocument, SearchIndex},
};
use futures_util::stream::{self, StreamExt};
use std::pin::pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Tunables for synchronization runs.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// Maximum number of items processed at once.
    pub concurrency: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl SyncSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.sync_concurrency.max(1),
        }
    }
}

/// Drives synchronization runs from a document source into the search index and cache.
///
/// At most one run is active at a time. Items are processed through a bounded pool and their
/// outcomes are recorded by a single consumer loop, so the tracker only ever has one writer.
pub struct SyncCoordinator {
    source: Arc<dyn DocumentSource>,
    vectorizer: Arc<dyn Vectorizer>,
    index: Arc<dyn SearchIndex>,
    cache: Arc<dyn CacheStore>,
    generation: Arc<CacheGeneration>,
    tracker: Arc<SyncStatusTracker>,
    settings: SyncSettings,
    run_guard: Arc<tokio::sync::Mutex<()>>,
    paused: watch::Sender<bool>,
    current: Mutex<Option<CancellationToken>>,
}

impl SyncCoordinator {
    /// Assemble a coordinator over explicit collaborator handles.
    pub fn new(
        source: Arc<dyn DocumentSource>,
        vectorizer: Arc<dyn Vectorizer>,
        index: Arc<dyn SearchIndex>,
        cache: Arc<dyn CacheStore>,
        generation: Arc<CacheGeneration>,
        settings: SyncSettings,
    ) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            source,
            vectorizer,
            index,
            cache,
            generation,
            tracker: Arc::new(SyncStatusTracker::new()),
            settings,
            run_guard: Arc::new(tokio::sync::Mutex::new(())),
            paused,
            current: Mutex::new(None),
        }
    }

    /// Execute one run to completion on the current task.
    pub async fn run(&self, cancel: CancellationToken) -> Result<SyncStatus, SyncError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        self.set_current(Some(cancel.clone()));
        let outcome = self.drive(&cancel).await;
        self.set_current(None);
        outcome
    }

    /// Launch a run on the runtime, failing immediately when one is already active.
    ///
    /// A run task that panics is marked failed in the tracker and releases the coordinator.
    pub fn spawn_run(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Result<SyncStatus, SyncError>>, SyncError> {
        let guard = Arc::clone(&self.run_guard)
            .try_lock_owned()
            .map_err(|_| SyncError::AlreadyRunning)?;
        let cancel = CancellationToken::new();
        self.set_current(Some(cancel.clone()));

        let coordinator = Arc::clone(self);
        let run = tokio::spawn({
            let coordinator = Arc::clone(self);
            async move { coordinator.drive(&cancel).await }
        });
        Ok(tokio::spawn(async move {
            let _guard = guard;
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(error) => Err(coordinator.fail_interrupted_run(error)),
            };
            coordinator.set_current(None);
            outcome
        }))
    }

    /// Stop dispatching new items; in-flight items still complete.
    pub fn pause(&self) {
        self.paused.send_replace(true);
        self.tracker.set_paused(true);
        tracing::info!("Sync dispatch paused");
    }

    /// Resume dispatching items.
    pub fn resume(&self) {
        self.paused.send_replace(false);
        self.tracker.set_paused(false);
        tracing::info!("Sync dispatch resumed");
    }

    /// Cancel the active run, returning whether one was active.
    pub fn stop(&self) -> bool {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(token) => {
                token.cancel();
                tracing::info!("Sync run stop requested");
                true
            }
            None => false,
        }
    }

    /// Snapshot of the current or most recent run.
    pub fn status(&self) -> SyncStatus {
        self.tracker.snapshot()
    }

    /// Discard the retained status of a finished run.
    pub fn reset(&self) -> Result<(), SyncError> {
        self.tracker.reset()
    }

    /// Shared handle to the status tracker.
    pub fn tracker(&self) -> Arc<SyncStatusTracker> {
        Arc::clone(&self.tracker)
    }

    /// Close out a run whose task panicked or was aborted so the tracker accepts the next one.
    fn fail_interrupted_run(&self, error: JoinError) -> SyncError {
        let reason = if error.is_panic() {
            "sync task panicked".to_string()
        } else {
            format!("sync task ended early: {error}")
        };
        if self.tracker.snapshot().state == SyncState::Running
            && let Err(abort_error) = self.tracker.abort(reason.clone())
        {
            tracing::warn!(error = %abort_error, "Could not mark interrupted run as failed");
        }
        tracing::error!(reason = %reason, "Sync task did not complete");
        SyncError::TaskFailed(reason)
    }

    fn set_current(&self, token: Option<CancellationToken>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<SyncStatus, SyncError> {
        let items = match self.source.list_items_needing_sync().await {
            Ok(items) => items,
            Err(error) => {
                let error = SyncError::from(error);
                self.tracker.start(0)?;
                self.tracker.abort(error.to_string())?;
                return Err(error);
            }
        };
        self.tracker.start(items.len() as u64)?;

        let outcome = self.consume(items, cancel).await;
        if self.tracker.snapshot().success_count > 0 {
            self.invalidate_search_results().await;
        }
        outcome
    }

    async fn consume(
        &self,
        items: Vec<ItemRef>,
        cancel: &CancellationToken,
    ) -> Result<SyncStatus, SyncError> {
        let mut outcomes = pin!(
            stream::iter(items)
                .map(|item| self.process_item(item))
                .buffer_unordered(self.settings.concurrency.max(1))
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.tracker.abort(SyncError::Cancelled.to_string())?;
                    return Err(SyncError::Cancelled);
                }
                next = outcomes.next() => match next {
                    None => break,
                    Some((_, Ok(()))) => self.tracker.record_success()?,
                    Some((item, Err(error))) if error.is_fatal() => {
                        tracing::error!(item = %item.id, error = %error, "Fatal error during sync");
                        self.tracker.abort(error.to_string())?;
                        return Err(error);
                    }
                    Some((item, Err(error))) => {
                        tracing::warn!(item = %item.id, error = %error, "Item failed to sync");
                        self.tracker.record_failure(format!("{}: {error}", item.id))?;
                    }
                },
            }
        }

        self.tracker.finish()
    }

    async fn process_item(&self, item: ItemRef) -> (ItemRef, Result<(), SyncError>) {
        self.wait_until_resumed().await;
        let outcome = self.sync_item(&item).await;
        (item, outcome)
    }

    async fn wait_until_resumed(&self) {
        let mut paused = self.paused.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = paused.wait_for(|paused| !*paused).await;
    }

    async fn sync_item(&self, item: &ItemRef) -> Result<(), SyncError> {
        let content = self.source.fetch_content(item).await?;
        let vector = self.vectorizer.vectorize(&content).await?;
        self.index
            .upsert(IndexedDocument {
                id: item.id.clone(),
                text: content,
                vector: vector.clone(),
                fingerprint: item.fingerprint.clone(),
                source_uri: Some(item.uri.clone()),
            })
            .await?;
        let vector_key = cache_key!(DOCUMENT_VECTOR_OPERATION, item.id);
        self.cache
            .put(&vector_key, CachedArtifact::Vector(vector))
            .await?;
        self.source.mark_synced(item).await?;
        tracing::debug!(item = %item.id, "Item synced");
        Ok(())
    }

    async fn invalidate_search_results(&self) {
        let generation = self.generation.advance();
        match self
            .cache
            .evict_prefix(&format!("{SEARCH_OPERATION}:"))
            .await
        {
            Ok(evicted) => {
                tracing::info!(generation, evicted, "Invalidated cached search results");
            }
            Err(error) => {
                tracing::warn!(generation, error = %error, "Failed to invalidate cached search results");
            }
        }
    }
}
