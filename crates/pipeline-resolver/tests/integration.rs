use std::time::Duration;

use pipeline_config::{MediaLoaderMode, NoAccountPolicy, PixelInjectorMode, Settings};
use pipeline_domain::{Store, Video, VideoStatus};
use pipeline_resolver::build_server;
use pipeline_telemetry::Metrics;
use pipeline_test_support::skip_without_postgres;

fn test_settings(bind_addr: &str) -> Settings {
    Settings {
        database_url: String::new(),
        redis_url: String::new(),
        queue_crawl_name: "pipeline:discovery".to_string(),
        queue_download_name: "pipeline:download".to_string(),
        queue_upload_name: "pipeline:upload".to_string(),
        queue_download_dlq_name: "pipeline:download:dlq".to_string(),
        queue_upload_dlq_name: "pipeline:upload:dlq".to_string(),
        download_max_retries: 3,
        download_fetch_timeout_seconds: 3600,
        upload_max_retries: 3,
        upload_dlq_replay_max: 5,
        upload_dlq_replay_backoff_seconds: 60,
        upload_max_concurrency: 4,
        upload_lock_ttl_seconds: 300,
        upload_task_timeout_seconds: 1800,
        upload_ready_timeout_seconds: 60,
        upload_verify_timeout_seconds: 120,
        no_account_policy: NoAccountPolicy::Wait,
        account_lease_seconds: 600,
        resolver_rate_limit_rpm: 600,
        resolver_concurrency: 3,
        resolver_cache_ttl_seconds: 3300,
        resolver_bind_addr: bind_addr.to_string(),
        pixel_injector_mode: PixelInjectorMode::Local,
        pixel_injector_local_share_scheme: "local".to_string(),
        media_loader_mode: MediaLoaderMode::Full,
        system_pause_key: "pipeline:paused".to_string(),
        orchestrator_tick_interval_seconds: 30,
        orchestrator_batch_size: 50,
        orchestrator_orphan_max_age_seconds: 7200,
        orchestrator_warn_threshold: 100,
        orchestrator_critical_threshold: 500,
        expired_video_max_age_seconds: 86_400,
        log_format: pipeline_config::LogFormat::Pretty,
        log_level: "info".to_string(),
    }
}

#[tokio::test]
async fn resolve_serves_a_persisted_cdn_url_and_rejects_unknown_ids() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("resolve_serves_a_persisted_cdn_url_and_rejects_unknown_ids");
    let store = Store::connect(postgres.connection_string()).await?;
    let metrics = Metrics::new()?;

    let mut video = Video::new("demo", "magnet:?xt=urn:btih:abc123");
    video.status = VideoStatus::Available;
    let video = store.videos().insert(&video).await?;
    store
        .videos()
        .set_cdn_url(video.id, "https://lh3.googleusercontent.com/stub=dv")
        .await?;

    let settings = test_settings("127.0.0.1:18199");
    let (server, addr) = build_server(&settings, store, metrics)?;
    tokio::spawn(server.serve(addr));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = reqwest::Client::new();

    let health = client.get(format!("http://{addr}/health")).send().await?;
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let resolved = client
        .get(format!("http://{addr}/resolve/{}", video.id))
        .send()
        .await?;
    assert_eq!(resolved.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resolved.json().await?;
    assert_eq!(body["cdn_url"], "https://lh3.googleusercontent.com/stub=dv");
    assert_eq!(body["source"], "database");

    let missing = client
        .get(format!("http://{addr}/resolve/{}", uuid::Uuid::new_v4()))
        .send()
        .await?;
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let bad_id = client
        .get(format!("http://{addr}/resolve/not-a-uuid"))
        .send()
        .await?;
    assert_eq!(bad_id.status(), reqwest::StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn resolve_reports_conflict_when_not_yet_uploaded() -> anyhow::Result<()> {
    let postgres = skip_without_postgres!("resolve_reports_conflict_when_not_yet_uploaded");
    let store = Store::connect(postgres.connection_string()).await?;
    let metrics = Metrics::new()?;

    let video = Video::new("demo", "magnet:?xt=urn:btih:def456");
    let video = store.videos().insert(&video).await?;

    let settings = test_settings("127.0.0.1:18200");
    let (server, addr) = build_server(&settings, store, metrics)?;
    tokio::spawn(server.serve(addr));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/resolve/{}", video.id))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);

    Ok(())
}
