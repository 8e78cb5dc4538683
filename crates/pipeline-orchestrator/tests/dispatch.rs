use std::time::Duration;

use pipeline_domain::{Store, Video};
use pipeline_orchestrator::{
    CrawlIngester, DiscoveryPayload, IngesterConfig, NoAccountPolicy, Orchestrator, OrchestratorConfig,
};
use pipeline_queue::queues;
use pipeline_scheduler::AccountScheduler;
use pipeline_test_support::{skip_without_postgres, skip_without_redis};

fn orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        tick_interval: Duration::from_secs(30),
        batch_size: 50,
        orphan_max_age_seconds: 7200,
        warn_threshold: 100,
        critical_threshold: 500,
        no_account_policy: NoAccountPolicy::Wait,
        download_queue_name: queues::DOWNLOAD.to_string(),
        upload_queue_name: queues::UPLOAD.to_string(),
        account_lease_duration: Duration::from_secs(600),
        expired_video_max_age_seconds: 86_400,
    }
}

/// Admitting a discovery payload must leave exactly one payload on the
/// download queue once the orchestrator ticks — never zero (lost work) and
/// never two (double dispatch from both the ingester and the tick).
#[tokio::test]
async fn admit_then_tick_dispatches_exactly_once() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("admit_then_tick_dispatches_exactly_once");
    let queue = skip_without_redis!("admit_then_tick_dispatches_exactly_once");

    let store = Store::connect(postgres.connection_string()).await?;
    let scheduler = AccountScheduler::new(store.pool().clone());

    let video = Video::new("discovered clip", "magnet:?xt=urn:btih:5555555555555555555555555555555555555555");
    let video = store.videos().insert(&video).await?;

    let discovery_queue = format!("{}-admit-then-tick", queues::DISCOVERY);
    let download_queue = format!("{}-admit-then-tick", queues::DOWNLOAD);

    let ingester = CrawlIngester::new(
        store.clone(),
        queue.clone(),
        IngesterConfig {
            discovery_queue_name: discovery_queue.clone(),
            download_queue_name: download_queue.clone(),
            max_retries: 3,
            poll_timeout: Duration::from_millis(200),
        },
    );

    queue
        .push_json(
            &discovery_queue,
            &DiscoveryPayload {
                video_id: video.id,
                magnet_uri: video.magnet_uri.clone().unwrap_or_default(),
            },
        )
        .await?;

    let created = ingester.drain_batch(1).await?;
    assert_eq!(created, 1);

    // The ingester only inserts a pending task row; it must not have pushed
    // anything onto the download queue itself.
    assert_eq!(queue.length(&download_queue).await?, 0);

    let mut config = orchestrator_config();
    config.download_queue_name.clone_from(&download_queue);
    let orchestrator = Orchestrator::new(store.clone(), queue.clone(), scheduler, config);

    let report = orchestrator.tick().await?;
    assert_eq!(report.dispatched, 1);
    assert_eq!(queue.length(&download_queue).await?, 1);

    let dispatched = queue
        .pop(&download_queue, Duration::from_secs(1))
        .await?
        .expect("a single payload must be present on the download queue");
    assert_eq!(dispatched.video_id, video.id);
    assert_eq!(queue.length(&download_queue).await?, 0);

    Ok(())
}
