//! Upload stage: push a downloaded payload through an isolated runtime and
//! obtain a publicly reachable share URL.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pipeline_domain::{Store, TaskState, VideoStatus};
use pipeline_queue::{Broker, DlqPayload, QueuePayload};
use pipeline_scheduler::AccountScheduler;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{StageError, StageResult};
use crate::traits::{ContainerRuntime, FileUploader, ShareVerifier};

const STAGE_NAME: &str = "upload";

/// Tunable knobs for [`UploadStageService`].
#[derive(Debug, Clone)]
pub struct UploadStageConfig {
    /// Dead-letter queue for permanently failed upload tasks.
    pub upload_dlq_name: String,
    /// Hard wall-clock limit on the whole upload pipeline.
    pub task_timeout: Duration,
    /// How long to wait for the provisioned runtime to become ready.
    pub ready_timeout: Duration,
    /// How long to wait for the share URL to appear after ingestion.
    pub verify_timeout: Duration,
}

/// Runs the upload stage contract described for the pipeline's upload queue.
pub struct UploadStageService {
    store: Store,
    queue: Broker,
    scheduler: AccountScheduler,
    runtime: Arc<dyn ContainerRuntime>,
    uploader: Arc<dyn FileUploader>,
    verifier: Arc<dyn ShareVerifier>,
    config: UploadStageConfig,
}

impl UploadStageService {
    /// Build an upload stage service over its collaborators.
    #[must_use]
    pub fn new(
        store: Store,
        queue: Broker,
        scheduler: AccountScheduler,
        runtime: Arc<dyn ContainerRuntime>,
        uploader: Arc<dyn FileUploader>,
        verifier: Arc<dyn ShareVerifier>,
        config: UploadStageConfig,
    ) -> Self {
        Self {
            store,
            queue,
            scheduler,
            runtime,
            uploader,
            verifier,
            config,
        }
    }

    /// Process a single payload popped from the upload queue, already bound
    /// to an `account_id` by the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] only when the bookkeeping writes that record
    /// an outcome themselves fail; collaborator failures are handled
    /// internally and never propagated here.
    pub async fn process(&self, payload: QueuePayload) -> StageResult<()> {
        let task_id = payload.task_id;
        let video_id = payload.video_id;

        let local_path = match self.hydrate_local_path(&payload).await? {
            Some(path) => path,
            None => {
                return self
                    .fail_permanently(&payload, "task has no local_path and video is missing one")
                    .await;
            }
        };

        if !Path::new(&local_path).is_file() {
            return self
                .fail_permanently(&payload, "local_path does not reference a file")
                .await;
        }

        let Some(account_id) = payload.account_id else {
            return self
                .fail_permanently(&payload, "task has no account_id bound")
                .await;
        };

        self.store
            .tasks()
            .update_state(task_id, TaskState::Uploading, None)
            .await?;
        self.store
            .videos()
            .update_status(video_id, VideoStatus::Uploading)
            .await?;

        let outcome = tokio::time::timeout(
            self.config.task_timeout,
            self.run_pipeline(task_id, &local_path),
        )
        .await;

        match outcome {
            Ok(Ok(share_url)) => self.succeed(&payload, video_id, account_id, &local_path, &share_url).await,
            Ok(Err(source)) => self.fail_transiently(&payload, "upload pipeline", source).await,
            Err(_) => {
                self.fail_transiently(
                    &payload,
                    "upload pipeline",
                    anyhow::anyhow!("task timed out after {:?}", self.config.task_timeout),
                )
                .await
            }
        }
    }

    async fn hydrate_local_path(&self, payload: &QueuePayload) -> StageResult<Option<String>> {
        if let Some(local_path) = payload.local_path.clone() {
            return Ok(Some(local_path));
        }
        let Some(video) = self.store.videos().find_by_id(payload.video_id).await? else {
            return Ok(None);
        };
        Ok(video.local_path)
    }

    async fn run_pipeline(&self, task_id: Uuid, local_path: &str) -> anyhow::Result<String> {
        let handle = self
            .runtime
            .provision(task_id, self.config.ready_timeout)
            .await?;

        let result = self
            .uploader
            .upload(task_id, handle.as_ref(), Path::new(local_path), self.config.verify_timeout)
            .await;

        if let Err(source) = self.runtime.destroy(handle.as_ref()).await {
            warn!(%task_id, error = %source, "best-effort runtime teardown failed");
        }

        let share_url = result?;

        if !self.verifier.verify(&share_url).await? {
            anyhow::bail!("share url {share_url} did not respond with a healthy status");
        }

        Ok(share_url)
    }

    async fn succeed(
        &self,
        payload: &QueuePayload,
        video_id: Uuid,
        account_id: Uuid,
        local_path: &str,
        share_url: &str,
    ) -> StageResult<()> {
        self.store.videos().set_share_url(video_id, share_url).await?;
        self.store.tasks().set_share_url(payload.task_id, share_url).await?;
        self.store
            .tasks()
            .update_state(payload.task_id, TaskState::Complete, None)
            .await?;

        let bytes = tokio::fs::metadata(local_path)
            .await
            .map(|metadata| i64::try_from(metadata.len()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        self.scheduler.apply_upload_usage(account_id, bytes).await?;
        self.scheduler.mark_used(account_id).await?;

        info!(task_id = %payload.task_id, %video_id, "upload complete");
        Ok(())
    }

    async fn fail_transiently(
        &self,
        payload: &QueuePayload,
        operation: &'static str,
        source: anyhow::Error,
    ) -> StageResult<()> {
        error!(task_id = %payload.task_id, %operation, error = %source, "upload stage failure");

        if payload.can_retry() {
            let message = source.to_string();
            self.store.tasks().record_retry(payload.task_id, &message).await?;
            self.store
                .videos()
                .update_status(payload.video_id, VideoStatus::Downloaded)
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
            .push_dlq(&self.config.upload_dlq_name, &dlq_entry)
            .await
            .map_err(|source| StageError::Transient {
                task_id: payload.task_id,
                operation: "fail_permanently.push_dlq",
                source: source.into(),
            })?;
        Ok(())
    }
}
