use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pipeline_domain::{Account, AccountStatus, Store, Video, VideoStatus};
use pipeline_orchestrator::{NoAccountPolicy, Orchestrator, OrchestratorConfig};
use pipeline_queue::{QueuePayload, queues};
use pipeline_scheduler::AccountScheduler;
use pipeline_stages::{DownloadStageConfig, DownloadStageService, MetadataProvider, Transcoder, TorrentClient};
use pipeline_test_support::{skip_without_postgres, skip_without_redis};
use uuid::Uuid;

struct UnreachableTorrentClient;

#[async_trait]
impl TorrentClient for UnreachableTorrentClient {
    async fn fetch(&self, _task_id: Uuid, _magnet_uri: &str, _timeout: Duration) -> anyhow::Result<PathBuf> {
        anyhow::bail!("torrent client should not be invoked when the payload is already on disk")
    }

    async fn remove(&self, _task_id: Uuid, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }
}

struct UnreachableTranscoder;

#[async_trait]
impl Transcoder for UnreachableTranscoder {
    async fn remux(&self, _task_id: Uuid, _input: &Path) -> anyhow::Result<PathBuf> {
        anyhow::bail!("transcoder should not be invoked when the payload is already on disk")
    }
}

struct NoopMetadataProvider;

#[async_trait]
impl MetadataProvider for NoopMetadataProvider {
    async fn probe(&self, _task_id: Uuid, _path: &Path) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

fn sample_account() -> Account {
    Account {
        id: Uuid::new_v4(),
        email: format!("{}@example.test", Uuid::new_v4()),
        status: AccountStatus::Active,
        last_used_at: None,
        cooldown_until: None,
        lease_expires_at: None,
        daily_uploaded_bytes: 0,
        daily_quota_bytes: 10 * 1024 * 1024 * 1024,
        quota_reset_at: Utc::now() + chrono::Duration::days(1),
        created_at: Utc::now(),
    }
}

/// The download stage must never push directly onto the upload queue: it
/// should only route the task row (queue_name + pending state) and leave
/// dispatch — and `account_id` assignment — to the orchestrator's tick.
/// A direct push here would reach the upload stage with no bound account
/// and fail it permanently.
#[tokio::test]
async fn route_to_upload_leaves_account_assignment_to_the_orchestrator() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("route_to_upload_leaves_account_assignment_to_the_orchestrator");
    let queue = skip_without_redis!("route_to_upload_leaves_account_assignment_to_the_orchestrator");

    let store = Store::connect(postgres.connection_string()).await?;
    let scheduler = AccountScheduler::new(store.pool().clone());
    store.accounts().insert(&sample_account()).await?;

    let download_queue = format!("{}-routing", queues::DOWNLOAD);
    let upload_queue = format!("{}-routing", queues::UPLOAD);

    let local_path = std::env::temp_dir().join(format!("pipeline-routing-test-{}.mp4", Uuid::new_v4()));
    tokio::fs::write(&local_path, b"stub payload").await?;

    let mut video = Video::new("already downloaded", "magnet:?xt=urn:btih:6666666666666666666666666666666666666666");
    video.local_path = Some(local_path.to_string_lossy().into_owned());
    video.status = VideoStatus::Discovered;
    let video = store.videos().insert(&video).await?;

    let task = pipeline_domain::Task::new(video.id, &download_queue, 3);
    let task = store.tasks().insert(&task).await?;

    let download_service = DownloadStageService::new(
        store.clone(),
        queue.clone(),
        Arc::new(UnreachableTorrentClient),
        Arc::new(UnreachableTranscoder),
        Arc::new(NoopMetadataProvider),
        DownloadStageConfig {
            upload_queue_name: upload_queue.clone(),
            download_dlq_name: format!("{download_queue}:dlq"),
            fetch_timeout: Duration::from_secs(60),
        },
    );

    let payload = QueuePayload::new(task.id, video.id, download_queue.clone(), 3);
    download_service.process(payload).await?;

    // route_to_upload must only mutate the task row, never push directly.
    assert_eq!(queue.length(&upload_queue).await?, 0);
    let routed = store.tasks().find_by_id(task.id).await?.expect("task must exist");
    assert_eq!(routed.queue_name, upload_queue);
    assert_eq!(routed.state, pipeline_domain::TaskState::Pending);

    let config = OrchestratorConfig {
        tick_interval: Duration::from_secs(30),
        batch_size: 50,
        orphan_max_age_seconds: 7200,
        warn_threshold: 100,
        critical_threshold: 500,
        no_account_policy: NoAccountPolicy::Wait,
        download_queue_name: download_queue.clone(),
        upload_queue_name: upload_queue.clone(),
        account_lease_duration: Duration::from_secs(600),
        expired_video_max_age_seconds: 86_400,
    };
    let orchestrator = Orchestrator::new(store.clone(), queue.clone(), scheduler, config);
    let report = orchestrator.tick().await?;
    assert_eq!(report.dispatched, 1);

    let dispatched = queue
        .pop(&upload_queue, Duration::from_secs(1))
        .await?
        .expect("orchestrator must dispatch the routed task onto the upload queue");
    assert!(dispatched.account_id.is_some(), "orchestrator must bind an account before dispatch");

    let _ = tokio::fs::remove_file(&local_path).await;
    Ok(())
}
