//! Collaborator interfaces implemented by concrete torrent, transcode,
//! container and upload backends. Stage services depend only on these
//! traits, so production adapters and local-mode test doubles implement
//! the same contract.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Fetches a BitTorrent payload to a local path.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Submit a magnet URI for download and return the completed local path.
    /// Implementations are expected to block until completion or `timeout`
    /// elapses, whichever comes first.
    async fn fetch(&self, task_id: Uuid, magnet_uri: &str, timeout: Duration) -> anyhow::Result<PathBuf>;

    /// Best-effort removal of the torrent's on-disk artefact and any
    /// engine-side session state. Failures here are logged, never fatal.
    async fn remove(&self, task_id: Uuid, path: &std::path::Path) -> anyhow::Result<()>;
}

/// Stream-copies a payload into a streaming-friendly container.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Remux `input` into a new file and return its path. Implementations
    /// must not re-encode; this is a container change only.
    async fn remux(&self, task_id: Uuid, input: &std::path::Path) -> anyhow::Result<PathBuf>;
}

/// Best-effort metadata lookup for a downloaded payload.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Look up metadata for the file at `path`. A `None` result means "no
    /// metadata available", which the download stage treats as success.
    async fn probe(&self, task_id: Uuid, path: &std::path::Path) -> anyhow::Result<Option<Value>>;
}

/// Handle to an isolated runtime the upload stage provisions per task.
pub trait RuntimeHandle: Send + Sync {
    /// Opaque identifier used for logging and teardown.
    fn id(&self) -> &str;
}

/// Provisions and tears down the short-lived isolated runtime each upload
/// task pushes through. One container per task, always torn down on every
/// exit path (success, failure, or cancellation).
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a fresh runtime instance for `task_id` and wait for readiness
    /// under `ready_timeout`.
    async fn provision(
        &self,
        task_id: Uuid,
        ready_timeout: Duration,
    ) -> anyhow::Result<Box<dyn RuntimeHandle>>;

    /// Tear down a previously provisioned runtime. Always called, even when
    /// the upload itself failed; errors are logged and never escalated.
    async fn destroy(&self, handle: &dyn RuntimeHandle) -> anyhow::Result<()>;
}

/// Pushes a local file into a provisioned runtime and waits for a public
/// share URL to appear.
#[async_trait]
pub trait FileUploader: Send + Sync {
    /// Push `local_path` through `runtime` and trigger ingestion, then
    /// block until a share URL is produced or `verify_timeout` elapses.
    async fn upload(
        &self,
        task_id: Uuid,
        runtime: &dyn RuntimeHandle,
        local_path: &std::path::Path,
        verify_timeout: Duration,
    ) -> anyhow::Result<String>;
}

/// Confirms a share URL is publicly reachable before the pipeline reports success.
#[async_trait]
pub trait ShareVerifier: Send + Sync {
    /// Issue a request against `share_url` and return whether it responded
    /// with a non-error status.
    async fn verify(&self, share_url: &str) -> anyhow::Result<bool>;
}

/// Resolves a share URL into a directly-playable CDN URL.
#[async_trait]
pub trait CdnResolver: Send + Sync {
    /// Fetch and parse `share_url`'s landing page for the CDN URL it embeds.
    async fn resolve(&self, share_url: &str) -> anyhow::Result<String>;
}
