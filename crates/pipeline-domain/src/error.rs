//! Error types for domain persistence operations.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the repository layer.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The requested video does not exist.
    #[error("video {id} not found")]
    VideoNotFound {
        /// Missing video identifier.
        id: Uuid,
    },
    /// The requested task does not exist.
    #[error("task {id} not found")]
    TaskNotFound {
        /// Missing task identifier.
        id: Uuid,
    },
    /// A video with the same info-hash already exists.
    #[error("video with info-hash {info_hash} already exists")]
    DuplicateInfoHash {
        /// Conflicting info-hash.
        info_hash: String,
    },
    /// The underlying database returned an error.
    #[error("database operation failed: {operation}")]
    Database {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying sqlx error.
        #[source]
        source: sqlx::Error,
    },
}

/// Convenience alias for domain repository results.
pub type DomainResult<T> = Result<T, DomainError>;
