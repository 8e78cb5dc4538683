//! Crawl ingester: turns discovery-queue payloads into pending download tasks.

use std::time::Duration;

use pipeline_domain::{Store, Task};
use pipeline_queue::Broker;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Payload shape produced by whatever discovers new content (a crawler, an
/// admin API, a backfill script) and consumed by [`CrawlIngester`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryPayload {
    /// Video to admit into the pipeline.
    pub video_id: Uuid,
    /// Magnet URI to fetch, echoed back for logging only — the authoritative
    /// copy lives on the video row.
    pub magnet_uri: String,
}

/// Tunable knobs for [`CrawlIngester`].
#[derive(Debug, Clone)]
pub struct IngesterConfig {
    /// Queue discovery payloads arrive on.
    pub discovery_queue_name: String,
    /// Queue newly created tasks are routed to.
    pub download_queue_name: String,
    /// Retry budget assigned to newly created tasks.
    pub max_retries: i32,
    /// How long a single drain iteration blocks waiting for a payload.
    pub poll_timeout: Duration,
}

/// Drains the discovery queue, creating one pending task per newly
/// discovered video and skipping videos that already have an open task.
pub struct CrawlIngester {
    store: Store,
    queue: Broker,
    config: IngesterConfig,
}

impl CrawlIngester {
    /// Build a crawl ingester over its collaborators.
    #[must_use]
    pub const fn new(store: Store, queue: Broker, config: IngesterConfig) -> Self {
        Self { store, queue, config }
    }

    /// Drain up to `batch_size` discovery payloads, admitting each into the
    /// pipeline. Returns the number of tasks created.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] if a domain or queue operation fails.
    /// An individual malformed or duplicate payload is skipped and logged,
    /// not treated as an error.
    pub async fn drain_batch(&self, batch_size: usize) -> OrchestratorResult<usize> {
        let mut created = 0_usize;
        for _ in 0..batch_size {
            let Some(payload) = self
                .queue
                .pop_json::<DiscoveryPayload>(&self.config.discovery_queue_name, self.config.poll_timeout)
                .await
                .map_err(|source| OrchestratorError::queue("ingester.drain.pop", source))?
            else {
                break;
            };

            if self.admit(&payload).await? {
                created += 1;
            }
        }
        Ok(created)
    }

    async fn admit(&self, payload: &DiscoveryPayload) -> OrchestratorResult<bool> {
        let video = self
            .store
            .videos()
            .find_by_id(payload.video_id)
            .await
            .map_err(|source| OrchestratorError::domain("ingester.find_video", source))?;

        let Some(_video) = video else {
            warn!(video_id = %payload.video_id, "discovery payload references unknown video, skipping");
            return Ok(false);
        };

        let has_open = self
            .store
            .tasks()
            .has_open_task(payload.video_id)
            .await
            .map_err(|source| OrchestratorError::domain("ingester.has_open_task", source))?;

        if has_open {
            info!(video_id = %payload.video_id, "video already has an open task, skipping replay");
            return Ok(false);
        }

        let task = Task::new(payload.video_id, &self.config.download_queue_name, self.config.max_retries);
        let task = self
            .store
            .tasks()
            .insert(&task)
            .await
            .map_err(|source| OrchestratorError::domain("ingester.insert_task", source))?;

        info!(
            video_id = %payload.video_id,
            task_id = %task.id,
            "admitted video into pipeline, awaiting orchestrator dispatch"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_payload_round_trips_through_json() {
        let payload = DiscoveryPayload {
            video_id: Uuid::new_v4(),
            magnet_uri: "magnet:?xt=urn:btih:demo".to_string(),
        };
        let encoded = serde_json::to_string(&payload).expect("encode");
        let decoded: DiscoveryPayload = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.video_id, payload.video_id);
    }
}
