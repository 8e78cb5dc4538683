//! Top-level error type wrapping every sub-crate's error as a named,
//! operation-tagged variant.

use thiserror::Error;

/// Errors raised while bootstrapping or running the pipeline binary.
#[derive(Debug, Error)]
#[allow(dead_code)]
pub(crate) enum AppError {
    /// A required environment variable was not set or could not be parsed.
    #[error("configuration operation {operation} failed")]
    Config {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying configuration error.
        #[source]
        source: pipeline_config::ConfigError,
    },
    /// Connecting to the store or applying migrations failed.
    #[error("store operation {operation} failed")]
    Store {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying error, already contextualized by `pipeline-domain`.
        #[source]
        source: anyhow::Error,
    },
    /// Connecting to the queue broker failed.
    #[error("queue operation {operation} failed")]
    Queue {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying queue error.
        #[source]
        source: pipeline_queue::QueueError,
    },
    /// An orchestrator tick or ingester drain failed.
    #[error("orchestrator operation {operation} failed")]
    Orchestrator {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying orchestrator error.
        #[source]
        source: pipeline_orchestrator::OrchestratorError,
    },
    /// A download or upload stage invocation failed.
    #[error("stage operation {operation} failed")]
    Stage {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying stage error.
        #[source]
        source: pipeline_stages::StageError,
    },
    /// Building or serving the resolver's HTTP surface failed.
    #[error("resolver operation {operation} failed")]
    Resolver {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying error, already contextualized by `pipeline-resolver`.
        #[source]
        source: anyhow::Error,
    },
    /// Installing the tracing subscriber or metrics registry failed.
    #[error("telemetry operation {operation} failed")]
    Telemetry {
        /// Named operation that failed, for log correlation.
        operation: &'static str,
        /// Underlying telemetry error.
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience alias for bootstrap and worker-loop results.
pub(crate) type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_display_carries_the_operation_tag() {
        let err = AppError::Config {
            operation: "settings.from_env",
            source: pipeline_config::ConfigError::MissingEnv { name: "DATABASE_URL" },
        };
        assert!(err.to_string().contains("settings.from_env"));
    }
}
