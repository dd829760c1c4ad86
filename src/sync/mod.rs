//! Synchronization runs: status tracking, document sources, and the run coordinator.

mod coordinator;
pub mod source;
mod tracker;

use crate::{cache::CacheError, embedding::VectorizationError, search::IndexError};
use thiserror::Error;

pub use coordinator::{SyncCoordinator, SyncSettings};
pub use source::{DocumentSource, FileSystemSource, ItemRef, SourceError};
pub use tracker::{MAX_RECENT_FAILURES, SyncState, SyncStatus, SyncStatusTracker};

/// Errors raised while driving or tracking a synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Items could not be enumerated from the source.
    #[error("Document source unavailable: {0}")]
    SourceUnavailable(String),
    /// Content of one item could not be read.
    #[error("Document read failed: {0}")]
    SourceRead(String),
    /// Vector generation failed for one item.
    #[error("Vectorization failed: {0}")]
    Vectorization(#[from] VectorizationError),
    /// Search index rejected the write for one item.
    #[error("Search index write failed: {0}")]
    IndexWrite(#[from] IndexError),
    /// Shared cache could not be written.
    #[error("Cache write failed: {0}")]
    Cache(#[from] CacheError),
    /// Tracker transition is not allowed from the current state.
    #[error("Sync status is {state}; transition not allowed")]
    InvalidState {
        /// State the tracker was in when the transition was attempted.
        state: SyncState,
    },
    /// The background task driving a run ended without reporting an outcome.
    #[error("Synchronization task failed: {0}")]
    TaskFailed(String),
    /// Another run already holds the coordinator.
    #[error("A synchronization run is already in progress")]
    AlreadyRunning,
    /// `finish` was called before every item was accounted for.
    #[error("Run incomplete: {processed} of {expected} items processed")]
    IncompleteRun {
        /// Items recorded so far.
        processed: u64,
        /// Items announced at start.
        expected: u64,
    },
    /// More outcomes were recorded than items announced at start.
    #[error("More items recorded than announced at start")]
    CounterOverflow,
    /// Run was stopped before all items were processed.
    #[error("Synchronization run cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether this error ends the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SyncError::SourceRead(_) | SyncError::Vectorization(_) | SyncError::IndexWrite(_)
        )
    }
}

impl From<SourceError> for SyncError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::Unavailable(_) => SyncError::SourceUnavailable(error.to_string()),
            SourceError::Read { .. } => SyncError::SourceRead(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_item_errors_are_not_fatal() {
        let vectorization =
            SyncError::from(VectorizationError::GenerationFailed("empty".into()));
        let index = SyncError::from(IndexError::Unavailable("down".into()));
        assert!(!vectorization.is_fatal());
        assert!(!index.is_fatal());
    }

    #[test]
    fn unreadable_document_fails_only_its_item() {
        let read = SyncError::from(SourceError::Read {
            path: "docs/image.png".into(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "not utf-8"),
        });
        assert!(matches!(read, SyncError::SourceRead(_)));
        assert!(!read.is_fatal());

        let listing = SyncError::from(SourceError::Unavailable("root missing".into()));
        assert!(matches!(listing, SyncError::SourceUnavailable(_)));
        assert!(listing.is_fatal());
    }

    #[test]
    fn infrastructure_errors_are_fatal() {
        assert!(SyncError::SourceUnavailable("gone".into()).is_fatal());
        assert!(SyncError::from(CacheError::Unavailable("full".into())).is_fatal());
        assert!(SyncError::Cancelled.is_fatal());
    }
}
