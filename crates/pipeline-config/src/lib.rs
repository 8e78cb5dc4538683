#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Environment-prefixed settings loader.
//!
//! [`Settings::from_env`] reads every `PIPELINE_`-prefixed variable once at
//! startup into a flat, immutable struct. `DATABASE_URL` and `REDIS_URL` are
//! read unprefixed, by the usual convention for store/broker DSNs. There is
//! no process-wide singleton: the CLI entry point constructs one `Settings`
//! and passes it by value into every component constructor.

mod error;

pub use error::{ConfigError, ConfigResult};

use std::str::FromStr;
use std::time::Duration;

/// Behavior when no upload account is eligible during an orchestrator tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoAccountPolicy {
    /// Leave upload-bound tasks pending until an account frees up.
    Wait,
    /// Fail upload-bound tasks immediately.
    Fail,
}

impl FromStr for NoAccountPolicy {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "wait" => Ok(Self::Wait),
            "fail" => Ok(Self::Fail),
            _ => Err("expected \"wait\" or \"fail\""),
        }
    }
}

/// Which collaborator backs the upload stage's container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelInjectorMode {
    /// Provision an isolated container runtime per upload.
    Redroid,
    /// Skip the runtime and emit a synthetic share URL, for local testing.
    Local,
}

impl FromStr for PixelInjectorMode {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "redroid" => Ok(Self::Redroid),
            "local" => Ok(Self::Local),
            _ => Err("expected \"redroid\" or \"local\""),
        }
    }
}

/// How thoroughly the download stage processes a task, for smoke testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaLoaderMode {
    /// Fetch, remux, and probe metadata.
    Full,
    /// Skip straight to the idempotent-resume check.
    Verify,
}

impl FromStr for MediaLoaderMode {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "full" => Ok(Self::Full),
            "verify" => Ok(Self::Verify),
            _ => Err("expected \"full\" or \"verify\""),
        }
    }
}

/// Structured-logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, ANSI-colored output.
    Pretty,
    /// Newline-delimited JSON, for log aggregation.
    Json,
}

impl FromStr for LogFormat {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err("expected \"pretty\" or \"json\""),
        }
    }
}

/// Immutable, fully-resolved settings for one process lifetime.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Postgres connection string.
    pub database_url: String,
    /// Redis connection string backing the queue broker.
    pub redis_url: String,
    /// Discovery queue name.
    pub queue_crawl_name: String,
    /// Download queue name.
    pub queue_download_name: String,
    /// Upload queue name.
    pub queue_upload_name: String,
    /// Download stage dead-letter queue name.
    pub queue_download_dlq_name: String,
    /// Upload stage dead-letter queue name.
    pub queue_upload_dlq_name: String,
    /// Retry budget for download tasks.
    pub download_max_retries: i32,
    /// Wall-clock budget for a single torrent fetch attempt.
    pub download_fetch_timeout_seconds: u64,
    /// Retry budget for upload tasks.
    pub upload_max_retries: i32,
    /// Maximum times a DLQ entry is replayed before it is left dead.
    pub upload_dlq_replay_max: u32,
    /// Per-attempt delay before a DLQ entry is eligible for replay, in seconds.
    pub upload_dlq_replay_backoff_seconds: u64,
    /// Number of cooperative upload worker loops to run.
    pub upload_max_concurrency: usize,
    /// TTL applied to the upload single-flight lock.
    pub upload_lock_ttl_seconds: u64,
    /// Wall-clock budget for an entire upload attempt.
    pub upload_task_timeout_seconds: u64,
    /// Wall-clock budget for the container runtime to become ready.
    pub upload_ready_timeout_seconds: u64,
    /// Wall-clock budget for the share URL to become reachable.
    pub upload_verify_timeout_seconds: u64,
    /// Orchestrator behavior when no upload account is eligible.
    pub no_account_policy: NoAccountPolicy,
    /// Lease duration handed out by the account scheduler.
    pub account_lease_seconds: u64,
    /// Requests per minute the resolver accepts before responding `429`.
    pub resolver_rate_limit_rpm: u32,
    /// Bounded concurrency for calls to the external CDN resolver.
    pub resolver_concurrency: usize,
    /// TTL applied to the resolver's in-memory CDN URL cache.
    pub resolver_cache_ttl_seconds: u64,
    /// Socket address the resolver HTTP server binds to.
    pub resolver_bind_addr: String,
    /// Upload collaborator backend.
    pub pixel_injector_mode: PixelInjectorMode,
    /// URL scheme synthesized for share URLs in local mode.
    pub pixel_injector_local_share_scheme: String,
    /// Download stage short-circuit mode, for smoke tests.
    pub media_loader_mode: MediaLoaderMode,
    /// Well-known key used to pause every queue's workers at once.
    pub system_pause_key: String,
    /// Orchestrator tick cadence.
    pub orchestrator_tick_interval_seconds: u64,
    /// Maximum pending tasks dispatched per orchestrator tick.
    pub orchestrator_batch_size: i64,
    /// Age past which a task stuck in a transient state is GC'd as an orphan.
    pub orchestrator_orphan_max_age_seconds: i64,
    /// Queue depth at which dispatch proceeds but logs a warning.
    pub orchestrator_warn_threshold: i64,
    /// Queue depth at which dispatch is skipped for the tick.
    pub orchestrator_critical_threshold: i64,
    /// Freshness window after which an `available` video is swept to `expired`.
    pub expired_video_max_age_seconds: i64,
    /// Structured logging output format.
    pub log_format: LogFormat,
    /// `tracing-subscriber` env-filter directive string.
    pub log_level: String,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] for an unset required variable, or
    /// [`ConfigError::InvalidValue`] when a variable is set but unparsable.
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            queue_crawl_name: optional("PIPELINE_QUEUE_CRAWL_NAME", "pipeline:discovery"),
            queue_download_name: optional("PIPELINE_QUEUE_DOWNLOAD_NAME", "pipeline:download"),
            queue_upload_name: optional("PIPELINE_QUEUE_UPLOAD_NAME", "pipeline:upload"),
            queue_download_dlq_name: optional("PIPELINE_QUEUE_DOWNLOAD_DLQ_NAME", "pipeline:download:dlq"),
            queue_upload_dlq_name: optional("PIPELINE_QUEUE_UPLOAD_DLQ_NAME", "pipeline:upload:dlq"),
            download_max_retries: parse_optional("PIPELINE_DOWNLOAD_MAX_RETRIES", 3)?,
            download_fetch_timeout_seconds: parse_optional("PIPELINE_DOWNLOAD_FETCH_TIMEOUT_SECONDS", 3600)?,
            upload_max_retries: parse_optional("PIPELINE_UPLOAD_MAX_RETRIES", 3)?,
            upload_dlq_replay_max: parse_optional("PIPELINE_UPLOAD_DLQ_REPLAY_MAX", 5)?,
            upload_dlq_replay_backoff_seconds: parse_optional("PIPELINE_UPLOAD_DLQ_REPLAY_BACKOFF_SECONDS", 60)?,
            upload_max_concurrency: parse_optional("PIPELINE_UPLOAD_MAX_CONCURRENCY", 4)?,
            upload_lock_ttl_seconds: parse_optional("PIPELINE_UPLOAD_LOCK_TTL_SECONDS", 300)?,
            upload_task_timeout_seconds: parse_optional("PIPELINE_UPLOAD_TASK_TIMEOUT_SECONDS", 1800)?,
            upload_ready_timeout_seconds: parse_optional("PIPELINE_UPLOAD_READY_TIMEOUT_SECONDS", 60)?,
            upload_verify_timeout_seconds: parse_optional("PIPELINE_UPLOAD_VERIFY_TIMEOUT_SECONDS", 120)?,
            no_account_policy: parse_optional("PIPELINE_NO_ACCOUNT_POLICY", NoAccountPolicy::Wait)?,
            account_lease_seconds: parse_optional("PIPELINE_ACCOUNT_LEASE_SECONDS", 600)?,
            resolver_rate_limit_rpm: parse_optional("PIPELINE_RESOLVER_RATE_LIMIT_RPM", 600)?,
            resolver_concurrency: parse_optional("PIPELINE_RESOLVER_CONCURRENCY", 3)?,
            resolver_cache_ttl_seconds: parse_optional("PIPELINE_RESOLVER_CACHE_TTL_SECONDS", 3300)?,
            resolver_bind_addr: optional("PIPELINE_RESOLVER_BIND_ADDR", "127.0.0.1:8080"),
            pixel_injector_mode: parse_optional("PIPELINE_PIXEL_INJECTOR_MODE", PixelInjectorMode::Local)?,
            pixel_injector_local_share_scheme: optional("PIPELINE_PIXEL_INJECTOR_LOCAL_SHARE_SCHEME", "local"),
            media_loader_mode: parse_optional("PIPELINE_MEDIA_LOADER_MODE", MediaLoaderMode::Full)?,
            system_pause_key: optional("PIPELINE_SYSTEM_PAUSE_KEY", "pipeline:paused"),
            orchestrator_tick_interval_seconds: parse_optional("PIPELINE_ORCHESTRATOR_TICK_INTERVAL_SECONDS", 30)?,
            orchestrator_batch_size: parse_optional("PIPELINE_ORCHESTRATOR_BATCH_SIZE", 50)?,
            orchestrator_orphan_max_age_seconds: parse_optional(
                "PIPELINE_ORCHESTRATOR_ORPHAN_MAX_AGE_SECONDS",
                7200,
            )?,
            orchestrator_warn_threshold: parse_optional("PIPELINE_ORCHESTRATOR_WARN_THRESHOLD", 100)?,
            orchestrator_critical_threshold: parse_optional("PIPELINE_ORCHESTRATOR_CRITICAL_THRESHOLD", 500)?,
            expired_video_max_age_seconds: parse_optional("PIPELINE_EXPIRED_VIDEO_MAX_AGE_SECONDS", 86_400)?,
            log_format: parse_optional("PIPELINE_LOG_FORMAT", LogFormat::Pretty)?,
            log_level: optional("PIPELINE_LOG_LEVEL", "info"),
        })
    }

    /// Upload DLQ replay backoff as a [`Duration`], for readability at call sites.
    #[must_use]
    pub const fn upload_dlq_replay_backoff(&self) -> Duration {
        Duration::from_secs(self.upload_dlq_replay_backoff_seconds)
    }

    /// Account lease duration as a [`Duration`].
    #[must_use]
    pub const fn account_lease_duration(&self) -> Duration {
        Duration::from_secs(self.account_lease_seconds)
    }
}

fn required(name: &'static str) -> ConfigResult<String> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnv { name })
}

fn optional(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_optional<T>(name: &'static str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(name) else {
        return Ok(default);
    };
    raw.parse::<T>().map_err(|err| ConfigError::InvalidValue {
        name,
        value: raw,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_account_policy_parses_known_values() {
        assert_eq!("wait".parse::<NoAccountPolicy>(), Ok(NoAccountPolicy::Wait));
        assert_eq!("fail".parse::<NoAccountPolicy>(), Ok(NoAccountPolicy::Fail));
        assert!("bogus".parse::<NoAccountPolicy>().is_err());
    }

    #[test]
    fn pixel_injector_mode_parses_known_values() {
        assert_eq!("local".parse::<PixelInjectorMode>(), Ok(PixelInjectorMode::Local));
        assert_eq!("redroid".parse::<PixelInjectorMode>(), Ok(PixelInjectorMode::Redroid));
    }

    #[test]
    fn parse_optional_falls_back_to_default_when_unset() {
        let value: i32 =
            parse_optional("PIPELINE_TEST_UNSET_VALUE_NOT_REAL", 7).expect("default applies");
        assert_eq!(value, 7);
    }
}
