use super::SyncError;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use time::OffsetDateTime;
use uuid::Uuid;

/// Number of per-item failure messages retained on the status.
pub const MAX_RECENT_FAILURES: usize = 16;

/// Lifecycle state of a synchronization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    /// No run has started since startup or the last reset.
    #[default]
    Idle,
    /// A run is in progress.
    Running,
    /// Every item was processed successfully.
    Success,
    /// Some items failed, at least one succeeded.
    PartialFailure,
    /// Every item failed, or the run was aborted.
    Failed,
}

impl SyncState {
    /// Uppercase identifier used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncState::Idle => "IDLE",
            SyncState::Running => "RUNNING",
            SyncState::Success => "SUCCESS",
            SyncState::PartialFailure => "PARTIAL_FAILURE",
            SyncState::Failed => "FAILED",
        }
    }

    /// Whether the state ends a run.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            SyncState::Success | SyncState::PartialFailure | SyncState::Failed
        )
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable status of the current or most recent synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatus {
    /// Identifier of the run, absent before the first run.
    pub run_id: Option<Uuid>,
    /// Lifecycle state.
    pub state: SyncState,
    /// Fraction of items processed, in `[0.0, 1.0]`.
    pub progress: f64,
    /// When the run started.
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    /// When the run reached a terminal state.
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    /// Latest failure message; set only on failed or partially failed runs.
    pub error: Option<String>,
    /// Items announced at start.
    pub data_count: u64,
    /// Items processed successfully.
    pub success_count: u64,
    /// Items that failed.
    pub fail_count: u64,
    /// Whether dispatch of new items is paused.
    pub paused: bool,
    /// Most recent per-item failure messages, oldest first.
    pub recent_failures: VecDeque<String>,
}

impl SyncStatus {
    fn processed(&self) -> u64 {
        self.success_count + self.fail_count
    }

    fn update_progress(&mut self) {
        if self.data_count > 0 {
            self.progress = self.processed() as f64 / self.data_count as f64;
        }
    }
}

/// Single-writer status holder for synchronization runs.
///
/// The coordinator driving a run is the only writer; any number of readers may take
/// [`snapshot`](Self::snapshot)s concurrently and always observe a consistent copy.
#[derive(Debug, Default)]
pub struct SyncStatusTracker {
    status: RwLock<SyncStatus>,
}

impl SyncStatusTracker {
    /// Create an idle tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a run over `total` items.
    pub fn start(&self, total: u64) -> Result<Uuid, SyncError> {
        let mut status = self.write();
        if status.state == SyncState::Running {
            return Err(SyncError::InvalidState {
                state: status.state,
            });
        }

        let run_id = Uuid::new_v4();
        *status = SyncStatus {
            run_id: Some(run_id),
            state: SyncState::Running,
            start_time: Some(OffsetDateTime::now_utc()),
            data_count: total,
            paused: status.paused,
            ..SyncStatus::default()
        };
        tracing::info!(run_id = %run_id, total, "Sync run started");
        Ok(run_id)
    }

    /// Count one successfully processed item.
    pub fn record_success(&self) -> Result<(), SyncError> {
        let mut status = self.write();
        Self::ensure_recordable(&status)?;
        status.success_count += 1;
        status.update_progress();
        Ok(())
    }

    /// Count one failed item; `message` replaces any earlier error message.
    pub fn record_failure(&self, message: impl Into<String>) -> Result<(), SyncError> {
        let message = message.into();
        let mut status = self.write();
        Self::ensure_recordable(&status)?;
        status.fail_count += 1;
        status.update_progress();
        if status.recent_failures.len() == MAX_RECENT_FAILURES {
            status.recent_failures.pop_front();
        }
        status.recent_failures.push_back(message.clone());
        status.error = Some(message);
        Ok(())
    }

    /// Close the run once every item has been recorded.
    pub fn finish(&self) -> Result<SyncStatus, SyncError> {
        let mut status = self.write();
        if status.state != SyncState::Running {
            return Err(SyncError::InvalidState {
                state: status.state,
            });
        }
        if status.processed() < status.data_count {
            return Err(SyncError::IncompleteRun {
                processed: status.processed(),
                expected: status.data_count,
            });
        }

        status.state = if status.fail_count == 0 {
            SyncState::Success
        } else if status.fail_count < status.data_count {
            SyncState::PartialFailure
        } else {
            SyncState::Failed
        };
        if status.state == SyncState::Success {
            status.error = None;
        }
        status.progress = 1.0;
        status.end_time = Some(OffsetDateTime::now_utc());
        tracing::info!(
            state = %status.state,
            success = status.success_count,
            failed = status.fail_count,
            "Sync run finished"
        );
        Ok(status.clone())
    }

    /// End the run immediately as failed, counting unprocessed items as failures.
    pub fn abort(&self, fatal: impl Into<String>) -> Result<SyncStatus, SyncError> {
        let fatal = fatal.into();
        let mut status = self.write();
        if status.state != SyncState::Running {
            return Err(SyncError::InvalidState {
                state: status.state,
            });
        }

        status.fail_count = status.data_count - status.success_count;
        status.state = SyncState::Failed;
        status.error = Some(fatal);
        status.end_time = Some(OffsetDateTime::now_utc());
        tracing::error!(
            error = status.error.as_deref().unwrap_or_default(),
            success = status.success_count,
            failed = status.fail_count,
            "Sync run aborted"
        );
        Ok(status.clone())
    }

    /// Consistent copy of the current status.
    pub fn snapshot(&self) -> SyncStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reflect whether dispatch is paused.
    pub fn set_paused(&self, paused: bool) {
        self.write().paused = paused;
    }

    /// Return a finished tracker to `Idle`, discarding the retained status.
    pub fn reset(&self) -> Result<(), SyncError> {
        let mut status = self.write();
        if status.state == SyncState::Running {
            return Err(SyncError::InvalidState {
                state: status.state,
            });
        }
        *status = SyncStatus {
            paused: status.paused,
            ..SyncStatus::default()
        };
        Ok(())
    }

    fn ensure_recordable(status: &SyncStatus) -> Result<(), SyncError> {
        if status.state != SyncState::Running {
            return Err(SyncError::InvalidState {
                state: status.state,
            });
        }
        if status.processed() >= status.data_count {
            return Err(SyncError::CounterOverflow);
        }
        Ok(())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SyncStatus> {
        self.status.write().unwrap_or_else(PoisonError::into_inner)
    }
}
