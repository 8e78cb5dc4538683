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

//! Periodic tick loop and crawl ingester that move tasks through the
//! pipeline's named queues.
//!
//! [`Orchestrator`] owns the dispatch policy (backpressure, account gating,
//! orphan GC, expired-video sweep); [`CrawlIngester`] owns admission of newly
//! discovered videos into the pipeline. Neither performs a stage's actual
//! work — that belongs to `pipeline-stages`.

mod error;
mod ingester;
mod tick;

pub use error::{OrchestratorError, OrchestratorResult};
pub use ingester::{CrawlIngester, DiscoveryPayload, IngesterConfig};
pub use tick::{NoAccountPolicy, Orchestrator, OrchestratorConfig, TickReport};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn orchestrator_config_carries_both_queue_names() {
        let config = OrchestratorConfig {
            tick_interval: Duration::from_secs(30),
            batch_size: 50,
            orphan_max_age_seconds: 7200,
            warn_threshold: 100,
            critical_threshold: 500,
            no_account_policy: NoAccountPolicy::Wait,
            download_queue_name: pipeline_queue::queues::DOWNLOAD.to_string(),
            upload_queue_name: pipeline_queue::queues::UPLOAD.to_string(),
            account_lease_duration: Duration::from_secs(600),
            expired_video_max_age_seconds: 86_400,
        };
        assert_ne!(config.download_queue_name, config.upload_queue_name);
    }
}
