//! Background worker loops driven by `serve`: the orchestrator tick, the
//! crawl ingester drain, the download/upload stage consumers, and the
//! upload dead-letter replay sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pipeline_config::Settings;
use pipeline_domain::{Store, TaskState};
use pipeline_orchestrator::{CrawlIngester, Orchestrator};
use pipeline_queue::{Broker, DlqPayload, QueuePayload};
use pipeline_stages::{DownloadStageService, UploadStageService};
use pipeline_telemetry::Metrics;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handles for every spawned background task, joined on shutdown.
pub(crate) struct WorkerHandles {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerHandles {
    /// Spawn the orchestrator tick loop, the crawl ingester loop, the
    /// download worker, one upload worker per `upload_max_concurrency`, and
    /// the DLQ replay sweep.
    pub(crate) fn spawn(
        settings: Settings,
        store: Store,
        queue: Broker,
        metrics: Metrics,
        download_service: Arc<DownloadStageService>,
        upload_service: Arc<UploadStageService>,
        orchestrator: Arc<Orchestrator>,
        ingester: Arc<CrawlIngester>,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(tick_loop(
            orchestrator,
            queue.clone(),
            metrics.clone(),
            Duration::from_secs(settings.orchestrator_tick_interval_seconds),
            [
                settings.queue_crawl_name.clone(),
                settings.queue_download_name.clone(),
                settings.queue_upload_name.clone(),
            ],
            stop.subscribe(),
        )));

        tasks.push(tokio::spawn(ingester_loop(ingester, stop.subscribe())));

        tasks.push(tokio::spawn(download_worker_loop(
            download_service,
            queue.clone(),
            settings.queue_download_name.clone(),
            settings.system_pause_key.clone(),
            stop.subscribe(),
        )));

        for _ in 0..settings.upload_max_concurrency.max(1) {
            tasks.push(tokio::spawn(upload_worker_loop(
                upload_service.clone(),
                queue.clone(),
                metrics.clone(),
                settings.queue_upload_name.clone(),
                settings.system_pause_key.clone(),
                Duration::from_secs(settings.upload_lock_ttl_seconds),
                stop.subscribe(),
            )));
        }

        tasks.push(tokio::spawn(dlq_replay_loop(
            store,
            queue,
            metrics,
            settings.queue_upload_dlq_name.clone(),
            settings.queue_upload_name.clone(),
            settings.upload_dlq_replay_max,
            settings.upload_dlq_replay_backoff(),
            settings.upload_max_retries,
            stop.subscribe(),
        )));

        Self { stop, tasks }
    }

    /// Signal every loop to stop and wait for them to unwind.
    pub(crate) async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn tick_loop(
    orchestrator: Arc<Orchestrator>,
    queue: Broker,
    metrics: Metrics,
    interval: Duration,
    depth_queue_names: [String; 3],
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        if *stop.borrow() {
            break;
        }
        match orchestrator.tick().await {
            Ok(report) => {
                metrics.inc_orchestrator_tick();
                metrics.add_orchestrator_gc(report.gc_count);
                for _ in 0..report.dispatched {
                    metrics.inc_orchestrator_dispatched();
                }
                for _ in 0..report.waiting_no_account {
                    metrics.inc_account_lease_contention();
                }
            }
            Err(source) => tracing::error!(error = %source, "orchestrator tick failed"),
        }

        for queue_name in &depth_queue_names {
            match queue.length(queue_name).await {
                Ok(depth) => metrics.set_queue_depth(queue_name, depth),
                Err(source) => tracing::error!(error = %source, queue = %queue_name, "queue depth check failed"),
            }
        }
    }
}

async fn ingester_loop(ingester: Arc<CrawlIngester>, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            result = ingester.drain_batch(32) => {
                if let Err(source) = result {
                    tracing::error!(error = %source, "crawl ingester drain failed");
                }
            }
            _ = stop.changed() => break,
        }
    }
}

async fn download_worker_loop(
    service: Arc<DownloadStageService>,
    queue: Broker,
    queue_name: String,
    system_pause_key: String,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }
        if is_paused(&queue, &queue_name, &system_pause_key).await {
            if wait_or_stop(&mut stop, Duration::from_secs(1)).await {
                break;
            }
            continue;
        }

        let popped = tokio::select! {
            result = queue.pop(&queue_name, Duration::from_secs(5)) => result,
            _ = stop.changed() => break,
        };

        match popped {
            Ok(Some(payload)) => {
                if let Err(source) = service.process(payload).await {
                    tracing::error!(error = %source, "download stage processing failed");
                }
            }
            Ok(None) => {}
            Err(source) => tracing::error!(error = %source, "download queue pop failed"),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_worker_loop(
    service: Arc<UploadStageService>,
    queue: Broker,
    metrics: Metrics,
    queue_name: String,
    system_pause_key: String,
    lock_ttl: Duration,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }
        if is_paused(&queue, &queue_name, &system_pause_key).await {
            if wait_or_stop(&mut stop, Duration::from_secs(1)).await {
                break;
            }
            continue;
        }

        if let Err(source) = queue.replay_due(&queue_name).await {
            tracing::error!(error = %source, "upload replay sweep failed");
        }

        let popped = tokio::select! {
            result = queue.pop(&queue_name, Duration::from_secs(5)) => result,
            _ = stop.changed() => break,
        };

        let payload = match popped {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(source) => {
                tracing::error!(error = %source, "upload queue pop failed");
                continue;
            }
        };

        let task_id = payload.task_id;
        let token = match queue.try_acquire_lock(task_id, lock_ttl).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::info!(%task_id, "upload single-flight lock contended, re-queuing");
                if let Err(source) = queue.push(&queue_name, &payload).await {
                    tracing::error!(error = %source, "re-queue after lock contention failed");
                }
                continue;
            }
            Err(source) => {
                tracing::error!(error = %source, "upload lock acquisition failed");
                continue;
            }
        };

        if let Err(source) = service.process(payload).await {
            tracing::error!(error = %source, "upload stage processing failed");
            metrics.inc_upload_retry();
        }

        if let Err(source) = queue.release_lock(task_id, &token).await {
            tracing::error!(error = %source, "upload lock release failed");
        }
    }
}

/// Classifies an upload DLQ entry's `error_message` as worth retrying.
/// Timeouts and connectivity failures are transient; missing-input and
/// not-found failures are permanent and never retried.
fn is_retryable(error_message: &str) -> bool {
    let message = error_message.to_ascii_lowercase();
    let permanent_markers = ["not found", "no local_path", "does not reference a file", "no account_id"];
    if permanent_markers.iter().any(|marker| message.contains(marker)) {
        return false;
    }
    let transient_markers = ["timed out", "timeout", "unreachable", "connection", "did not respond"];
    transient_markers.iter().any(|marker| message.contains(marker))
}

#[allow(clippy::too_many_arguments)]
async fn dlq_replay_loop(
    store: Store,
    queue: Broker,
    metrics: Metrics,
    dlq_queue_name: String,
    upload_queue_name: String,
    replay_max: u32,
    backoff: Duration,
    max_retries: i32,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }

        let popped = tokio::select! {
            result = queue.pop_json::<DlqPayload>(&dlq_queue_name, Duration::from_secs(5)) => result,
            _ = stop.changed() => break,
        };

        let entry = match popped {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(source) => {
                tracing::error!(error = %source, "dlq pop failed");
                continue;
            }
        };

        if entry.dlq_replays >= replay_max || !is_retryable(&entry.error_message) {
            tracing::info!(task_id = %entry.task_id, dlq_replays = entry.dlq_replays, "dlq entry left dead");
            metrics.inc_upload_dlq_push();
            continue;
        }

        let mut payload = QueuePayload::new(entry.task_id, entry.video_id, upload_queue_name.clone(), max_retries.max(0).cast_unsigned());
        payload.retries = entry.attempts;
        let ready_at = Utc::now() + chrono::Duration::from_std(backoff * (entry.dlq_replays + 1)).unwrap_or_default();

        if let Err(source) = store.tasks().update_state(entry.task_id, TaskState::Pending, None).await {
            tracing::error!(error = %source, task_id = %entry.task_id, "dlq replay state reset failed");
            continue;
        }

        if let Err(source) = queue.schedule_replay(&upload_queue_name, &payload, ready_at).await {
            tracing::error!(error = %source, "dlq replay scheduling failed");
        } else {
            tracing::info!(task_id = %entry.task_id, dlq_replays = entry.dlq_replays + 1, %ready_at, "dlq entry scheduled for replay");
        }
    }
}

async fn is_paused(queue: &Broker, queue_name: &str, system_pause_key: &str) -> bool {
    match queue.is_paused(queue_name).await {
        Ok(true) => return true,
        Ok(false) => {}
        Err(source) => tracing::error!(error = %source, "pause check failed"),
    }
    queue.is_paused(system_pause_key).await.unwrap_or(false)
}

/// Sleep for `duration` unless a shutdown signal arrives first. Returns
/// `true` if shutdown was signaled.
async fn wait_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        _ = stop.changed() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::{Task, Video};
    use pipeline_test_support::{skip_without_postgres, skip_without_redis};

    /// A replayed DLQ entry must reset its task row to `pending` so the
    /// orchestrator's next tick dispatches it, rather than leaving it in
    /// whatever transient or terminal state it was in when it entered the DLQ.
    #[tokio::test]
    async fn replaying_a_dlq_entry_resets_the_task_to_pending() -> anyhow::Result<()> {
        let postgres = skip_without_postgres!("replaying_a_dlq_entry_resets_the_task_to_pending");
        let queue = skip_without_redis!("replaying_a_dlq_entry_resets_the_task_to_pending");

        let store = Store::connect(postgres.connection_string()).await?;
        let metrics = Metrics::new()?;

        let video = Video::new("dlq replay", "magnet:?xt=urn:btih:7777777777777777777777777777777777777777");
        let video = store.videos().insert(&video).await?;
        let task = Task::new(video.id, "pipeline:upload-dlq-test", 3);
        let task = store.tasks().insert(&task).await?;
        store.tasks().update_state(task.id, TaskState::Failed, Some("connection timed out")).await?;

        let dlq_queue = format!("pipeline:upload:dlq-{}", task.id);
        let upload_queue = format!("pipeline:upload-{}", task.id);

        queue
            .push_dlq(
                &dlq_queue,
                &DlqPayload {
                    task_id: task.id,
                    video_id: video.id,
                    stage: "upload".to_string(),
                    attempts: 1,
                    error_message: "connection timed out".to_string(),
                    failed_at: Utc::now().timestamp(),
                    dlq_replays: 0,
                },
            )
            .await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(dlq_replay_loop(
            store.clone(),
            queue.clone(),
            metrics,
            dlq_queue,
            upload_queue,
            5,
            Duration::from_millis(10),
            3,
            stop_rx,
        ));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let _ = stop_tx.send(true);
        handle.await?;

        let persisted = store.tasks().find_by_id(task.id).await?.expect("task must exist");
        assert_eq!(persisted.state, TaskState::Pending);

        Ok(())
    }
}
