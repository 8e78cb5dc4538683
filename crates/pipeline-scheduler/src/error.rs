//! Scheduler error primitives.

use thiserror::Error;

/// Errors raised by [`crate::AccountScheduler`] operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No account satisfied the active/quota/lease contract.
    #[error("no active accounts available")]
    NoActiveAccounts,
    /// The underlying database returned an error.
    #[error("database operation {operation} failed")]
    Database {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying sqlx error.
        #[source]
        source: sqlx::Error,
    },
}

/// Convenience alias for scheduler results.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
