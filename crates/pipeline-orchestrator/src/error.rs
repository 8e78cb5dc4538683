//! Orchestrator error primitives.

use thiserror::Error;

/// Errors raised while ticking the orchestrator or draining the crawl queue.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A domain repository operation failed.
    #[error("domain operation {operation} failed")]
    Domain {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying domain error.
        #[source]
        source: pipeline_domain::DomainError,
    },
    /// A queue broker operation failed.
    #[error("queue operation {operation} failed")]
    Queue {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying queue error.
        #[source]
        source: pipeline_queue::QueueError,
    },
    /// A scheduler operation failed for a reason other than "no active accounts",
    /// which is not an error for orchestrator purposes (see `no_account_policy`).
    #[error("scheduler operation {operation} failed")]
    Scheduler {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying scheduler error.
        #[source]
        source: pipeline_scheduler::SchedulerError,
    },
    /// A discovery payload was malformed and could not be ingested.
    #[error("invalid discovery payload: {reason}")]
    InvalidDiscoveryPayload {
        /// Human-readable reason the payload was rejected.
        reason: String,
    },
}

impl OrchestratorError {
    pub(crate) const fn domain(operation: &'static str, source: pipeline_domain::DomainError) -> Self {
        Self::Domain { operation, source }
    }

    pub(crate) const fn queue(operation: &'static str, source: pipeline_queue::QueueError) -> Self {
        Self::Queue { operation, source }
    }
}

/// Convenience alias for orchestrator results.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_discovery_payload_reports_reason() {
        let err = OrchestratorError::InvalidDiscoveryPayload {
            reason: "video_id is not a uuid".to_string(),
        };
        assert!(err.to_string().contains("video_id is not a uuid"));
    }
}
