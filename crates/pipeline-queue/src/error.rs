//! Queue broker error primitives.

use thiserror::Error;

/// Errors raised by broker operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The underlying Redis connection or command failed.
    #[error("redis operation {operation} failed")]
    Redis {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying redis error.
        #[source]
        source: redis::RedisError,
    },
    /// A payload could not be encoded or decoded as JSON.
    #[error("payload {operation} failed")]
    Codec {
        /// Named operation that failed.
        operation: &'static str,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias for broker results.
pub type QueueResult<T> = Result<T, QueueError>;
