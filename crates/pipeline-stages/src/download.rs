//! Download stage: fetch a torrent payload, remux it, and route it to upload.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pipeline_domain::{Store, TaskState, VideoStatus};
use pipeline_queue::{Broker, DlqPayload, QueuePayload};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{StageError, StageResult};
use crate::traits::{MetadataProvider, Transcoder, TorrentClient};

const STAGE_NAME: &str = "download";

/// Tunable knobs for [`DownloadStageService`].
#[derive(Debug, Clone)]
pub struct DownloadStageConfig {
    /// Queue a successfully downloaded task is routed to.
    pub upload_queue_name: String,
    /// Dead-letter queue for permanently failed download tasks.
    pub download_dlq_name: String,
    /// Hard wall-clock limit on torrent completion.
    pub fetch_timeout: Duration,
}

/// Runs the download stage contract described for the pipeline's download queue.
pub struct DownloadStageService {
    store: Store,
    queue: Broker,
    torrent_client: Arc<dyn TorrentClient>,
    transcoder: Arc<dyn Transcoder>,
    metadata: Arc<dyn MetadataProvider>,
    config: DownloadStageConfig,
}

impl DownloadStageService {
    /// Build a download stage service over its collaborators.
    #[must_use]
    pub fn new(
        store: Store,
        queue: Broker,
        torrent_client: Arc<dyn TorrentClient>,
        transcoder: Arc<dyn Transcoder>,
        metadata: Arc<dyn MetadataProvider>,
        config: DownloadStageConfig,
    ) -> Self {
        Self {
            store,
            queue,
            torrent_client,
            transcoder,
            metadata,
            config,
        }
    }

    /// Process a single payload popped from the download queue.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] only when the bookkeeping writes that record
    /// an outcome (success, retry, or dead-letter) themselves fail; pipeline
    /// failures in the torrent/transcode/metadata collaborators are handled
    /// internally and never propagated here.
    pub async fn process(&self, payload: QueuePayload) -> StageResult<()> {
        let task_id = payload.task_id;
        let video_id = payload.video_id;

        let Some(video) = self.store.videos().find_by_id(video_id).await? else {
            return self.fail_permanently(&payload, "video not found").await;
        };

        let Some(magnet_uri) = video.magnet_uri.clone() else {
            return self.fail_permanently(&payload, "video has no magnet uri").await;
        };

        if let Some(local_path) = video.local_path.as_deref()
            && Path::new(local_path).exists()
        {
            info!(%task_id, %video_id, "download already satisfied on disk, routing to upload");
            self.store
                .videos()
                .update_status(video_id, VideoStatus::Downloaded)
                .await?;
            return self.route_to_upload(&payload, local_path).await;
        }

        match self.run_pipeline(task_id, video_id, &magnet_uri).await {
            Ok(local_path) => self.succeed(&payload, &local_path).await,
            Err(source) => self.fail_transiently(&payload, "download pipeline", source).await,
        }
    }

    async fn run_pipeline(&self, task_id: Uuid, video_id: Uuid, magnet_uri: &str) -> anyhow::Result<String> {
        self.store
            .tasks()
            .update_state(task_id, TaskState::Downloading, None)
            .await?;

        let downloaded = self
            .torrent_client
            .fetch(task_id, magnet_uri, self.config.fetch_timeout)
            .await?;

        self.store
            .tasks()
            .update_state(task_id, TaskState::Remuxing, None)
            .await?;

        let remuxed = self.transcoder.remux(task_id, &downloaded).await?;

        if let Err(source) = self.torrent_client.remove(task_id, &downloaded).await {
            warn!(%task_id, error = %source, "best-effort torrent artefact removal failed");
        }

        let metadata = match self.metadata.probe(task_id, &remuxed).await {
            Ok(metadata) => metadata,
            Err(source) => {
                warn!(%task_id, error = %source, "best-effort metadata lookup failed");
                None
            }
        };

        let local_path = remuxed.to_string_lossy().into_owned();
        self.store.videos().set_local_path(video_id, &local_path).await?;
        if let Some(metadata) = metadata {
            self.store.videos().set_metadata(video_id, metadata).await?;
        }

        Ok(local_path)
    }

    async fn succeed(&self, payload: &QueuePayload, local_path: &str) -> StageResult<()> {
        self.store
            .videos()
            .update_status(payload.video_id, VideoStatus::Downloaded)
            .await?;
        self.route_to_upload(payload, local_path).await
    }

    async fn route_to_upload(&self, payload: &QueuePayload, local_path: &str) -> StageResult<()> {
        self.store
            .tasks()
            .route_to_queue(payload.task_id, &self.config.upload_queue_name)
            .await?;
        self.store
            .tasks()
            .set_local_path(payload.task_id, local_path)
            .await?;

        Ok(())
    }

    async fn fail_transiently(
        &self,
        payload: &QueuePayload,
        operation: &'static str,
        source: anyhow::Error,
    ) -> StageResult<()> {
        error!(task_id = %payload.task_id, %operation, error = %source, "download stage failure");

        if payload.can_retry() {
            let message = source.to_string();
            self.store.tasks().record_retry(payload.task_id, &message).await?;
            self.store
                .videos()
                .update_status(payload.video_id, VideoStatus::Discovered)
                .await?;

            let retried = payload.with_incremented_retries();
            self.queue.push(&payload.queue_name, &retried).await.map_err(|err| {
                StageError::Transient {
                    task_id: payload.task_id,
                    operation: "fail_transiently.requeue",
                    source: err.into(),
                }
            })?;
            Ok(())
        } else {
            self.fail_permanently(payload, &source.to_string()).await
        }
    }

    async fn fail_permanently(&self, payload: &QueuePayload, reason: &str) -> StageResult<()> {
        self.store
            .tasks()
            .update_state(payload.task_id, TaskState::Failed, Some(reason))
            .await?;
        self.store
            .videos()
            .update_status(payload.video_id, VideoStatus::Failed)
            .await?;

        let dlq_entry = DlqPayload {
            task_id: payload.task_id,
            video_id: payload.video_id,
            stage: STAGE_NAME.to_string(),
            attempts: payload.retries + 1,
            error_message: reason.to_string(),
            failed_at: Utc::now().timestamp(),
            dlq_replays: 0,
        };
        self.queue
            .push_dlq(&self.config.download_dlq_name, &dlq_entry)
            .await
            .map_err(|source| StageError::Transient {
                task_id: payload.task_id,
                operation: "fail_permanently.push_dlq",
                source: source.into(),
            })?;
        Ok(())
    }
}
