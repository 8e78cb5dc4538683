//! Stage error primitives.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while running a download or upload stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The video referenced by the task does not exist.
    #[error("video {video_id} not found")]
    VideoNotFound {
        /// Missing video identifier.
        video_id: Uuid,
    },
    /// The task cannot proceed because required input is missing, and
    /// retrying would not help (e.g. no magnet URI, no local file).
    #[error("task {task_id} permanently failed: {reason}")]
    Permanent {
        /// Task identifier.
        task_id: Uuid,
        /// Human-readable explanation, persisted as the task's error message.
        reason: String,
    },
    /// A collaborator call failed in a way that is worth retrying.
    #[error("task {task_id} transient failure during {operation}")]
    Transient {
        /// Task identifier.
        task_id: Uuid,
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },
    /// The domain repository layer returned an error.
    #[error(transparent)]
    Domain(#[from] pipeline_domain::DomainError),
    /// The scheduler returned an error while binding an upload account.
    #[error(transparent)]
    Scheduler(#[from] pipeline_scheduler::SchedulerError),
}

/// Convenience alias for stage results.
pub type StageResult<T> = Result<T, StageError>;
