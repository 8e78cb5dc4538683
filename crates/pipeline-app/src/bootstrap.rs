//! Environment-derived construction of every pipeline component, split from
//! the dependency-injected run loop so tests can exercise [`run_app_with`]
//! against fakes without touching the process environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pipeline_config::{PixelInjectorMode, Settings};
use pipeline_domain::Store;
use pipeline_orchestrator::{CrawlIngester, IngesterConfig, NoAccountPolicy, Orchestrator, OrchestratorConfig};
use pipeline_queue::Broker;
use pipeline_scheduler::AccountScheduler;
use pipeline_stages::{DownloadStageConfig, DownloadStageService, UploadStageConfig, UploadStageService};
use pipeline_telemetry::{LogFormat as TelemetryLogFormat, LoggingConfig, Metrics, init_logging};

use crate::error::{AppError, AppResult};
use crate::local::{
    LocalContainerRuntime, LocalFileUploader, LocalMetadataProvider, LocalShareVerifier, LocalTorrentClient,
    LocalTranscoder,
};
use crate::workers::WorkerHandles;

/// Every component the CLI's `serve` subcommand needs, constructed once at
/// startup and handed by value into [`run_app_with`].
pub(crate) struct BootstrapDependencies {
    pub(crate) settings: Settings,
    pub(crate) store: Store,
    pub(crate) queue: Broker,
    pub(crate) scheduler: AccountScheduler,
    pub(crate) metrics: Metrics,
    pub(crate) download_service: Arc<DownloadStageService>,
    pub(crate) upload_service: Arc<UploadStageService>,
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) ingester: Arc<CrawlIngester>,
    pub(crate) resolver_server: pipeline_resolver::ApiServer,
    pub(crate) resolver_addr: std::net::SocketAddr,
}

fn map_no_account_policy(policy: pipeline_config::NoAccountPolicy) -> NoAccountPolicy {
    match policy {
        pipeline_config::NoAccountPolicy::Wait => NoAccountPolicy::Wait,
        pipeline_config::NoAccountPolicy::Fail => NoAccountPolicy::Fail,
    }
}

impl BootstrapDependencies {
    /// Read settings from the environment and construct every collaborator:
    /// the store (applying migrations), the queue broker, the account
    /// scheduler, the local-mode stage collaborators, the orchestrator, the
    /// crawl ingester, and the resolver's HTTP server.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if any dependency fails to initialize.
    pub(crate) async fn from_env() -> AppResult<Self> {
        let settings = Settings::from_env().map_err(|source| AppError::Config {
            operation: "settings.from_env",
            source,
        })?;

        let logging = LoggingConfig {
            level: &settings.log_level,
            format: match settings.log_format {
                pipeline_config::LogFormat::Pretty => TelemetryLogFormat::Pretty,
                pipeline_config::LogFormat::Json => TelemetryLogFormat::Json,
            },
            build_sha: pipeline_telemetry::build_sha(),
        };
        init_logging(&logging).map_err(|source| AppError::Telemetry {
            operation: "init_logging",
            source,
        })?;

        let metrics = Metrics::new().map_err(|source| AppError::Telemetry {
            operation: "metrics.new",
            source,
        })?;

        let store = Store::connect(&settings.database_url)
            .await
            .map_err(|source| AppError::Store {
                operation: "store.connect",
                source,
            })?;

        let queue = Broker::connect(&settings.redis_url)
            .await
            .map_err(|source| AppError::Queue {
                operation: "broker.connect",
                source,
            })?;

        let scheduler = AccountScheduler::new(store.pool().clone());

        let media_root = PathBuf::from("./pipeline-local-media");
        let torrent_client = Arc::new(LocalTorrentClient::new(media_root));
        let transcoder = Arc::new(LocalTranscoder);
        let metadata = Arc::new(LocalMetadataProvider);
        let runtime = Arc::new(LocalContainerRuntime);
        let uploader = Arc::new(LocalFileUploader::new(settings.pixel_injector_local_share_scheme.clone()));
        let verifier = Arc::new(LocalShareVerifier);

        if settings.pixel_injector_mode != PixelInjectorMode::Local {
            tracing::warn!(
                "pixel_injector_mode is not Local; this build only ships local-mode collaborators, running with them anyway"
            );
        }

        let download_service = Arc::new(DownloadStageService::new(
            store.clone(),
            queue.clone(),
            torrent_client,
            transcoder,
            metadata,
            DownloadStageConfig {
                upload_queue_name: settings.queue_upload_name.clone(),
                download_dlq_name: settings.queue_download_dlq_name.clone(),
                fetch_timeout: Duration::from_secs(settings.download_fetch_timeout_seconds),
            },
        ));

        let upload_service = Arc::new(UploadStageService::new(
            store.clone(),
            queue.clone(),
            scheduler.clone(),
            runtime,
            uploader,
            verifier,
            UploadStageConfig {
                upload_dlq_name: settings.queue_upload_dlq_name.clone(),
                task_timeout: Duration::from_secs(settings.upload_task_timeout_seconds),
                ready_timeout: Duration::from_secs(settings.upload_ready_timeout_seconds),
                verify_timeout: Duration::from_secs(settings.upload_verify_timeout_seconds),
            },
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            queue.clone(),
            scheduler.clone(),
            OrchestratorConfig {
                tick_interval: Duration::from_secs(settings.orchestrator_tick_interval_seconds),
                batch_size: settings.orchestrator_batch_size,
                orphan_max_age_seconds: settings.orchestrator_orphan_max_age_seconds,
                warn_threshold: settings.orchestrator_warn_threshold,
                critical_threshold: settings.orchestrator_critical_threshold,
                no_account_policy: map_no_account_policy(settings.no_account_policy),
                download_queue_name: settings.queue_download_name.clone(),
                upload_queue_name: settings.queue_upload_name.clone(),
                account_lease_duration: settings.account_lease_duration(),
                expired_video_max_age_seconds: settings.expired_video_max_age_seconds,
            },
        ));

        let ingester = Arc::new(CrawlIngester::new(
            store.clone(),
            queue.clone(),
            IngesterConfig {
                discovery_queue_name: settings.queue_crawl_name.clone(),
                download_queue_name: settings.queue_download_name.clone(),
                max_retries: settings.download_max_retries,
                poll_timeout: Duration::from_secs(5),
            },
        ));

        let (resolver_server, resolver_addr) =
            pipeline_resolver::build_server(&settings, store.clone(), metrics.clone()).map_err(|source| {
                AppError::Resolver {
                    operation: "build_server",
                    source,
                }
            })?;

        Ok(Self {
            settings,
            store,
            queue,
            scheduler,
            metrics,
            download_service,
            upload_service,
            orchestrator,
            ingester,
            resolver_server,
            resolver_addr,
        })
    }
}

/// Load dependencies from the environment and run the server until shutdown.
///
/// # Errors
///
/// Returns [`AppError`] if construction or any background task fails.
pub(crate) async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env().await?;
    run_app_with(dependencies).await
}

/// Run every background worker plus the resolver's HTTP server until
/// `ctrl_c`, then join all of them before returning.
///
/// # Errors
///
/// Returns [`AppError`] if any background task exits with an error.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    let BootstrapDependencies {
        settings,
        store,
        queue,
        scheduler: _scheduler,
        metrics,
        download_service,
        upload_service,
        orchestrator,
        ingester,
        resolver_server,
        resolver_addr,
    } = dependencies;

    let handles = WorkerHandles::spawn(settings, store, queue, metrics, download_service, upload_service, orchestrator, ingester);

    tokio::select! {
        result = resolver_server.serve(resolver_addr) => {
            result.map_err(|source| AppError::Resolver { operation: "serve", source })?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal, stopping background workers");
        }
    }

    handles.shutdown().await;
    Ok(())
}
