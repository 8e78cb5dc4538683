//! Error types for loading settings from the environment.

use thiserror::Error;

/// Errors raised while loading [`crate::Settings`] from the process environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable {name}")]
    MissingEnv {
        /// Name of the missing variable.
        name: &'static str,
    },
    /// An environment variable was set but could not be parsed.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Name of the offending variable.
        name: &'static str,
        /// Raw value read from the environment.
        value: String,
        /// Human-readable reason the value was rejected.
        reason: String,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
