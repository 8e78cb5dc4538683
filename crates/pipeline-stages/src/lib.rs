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

//! Collaborator interfaces and stage services that move a video from a
//! magnet URI through to a publicly resolvable share URL.
//!
//! The download and upload stage services depend only on the traits in
//! [`traits`], so production adapters (a real torrent client, a container
//! runtime) and local-mode test doubles implement the same contract and the
//! orchestrator wires either in without the stage services knowing which.

mod download;
mod error;
mod traits;
mod upload;

pub use download::{DownloadStageConfig, DownloadStageService};
pub use error::{StageError, StageResult};
pub use traits::{
    CdnResolver, ContainerRuntime, FileUploader, MetadataProvider, RuntimeHandle, ShareVerifier,
    Transcoder, TorrentClient,
};
pub use upload::{UploadStageConfig, UploadStageService};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use uuid::Uuid;

    struct StubTorrentClient;

    #[async_trait]
    impl TorrentClient for StubTorrentClient {
        async fn fetch(&self, _task_id: Uuid, _magnet_uri: &str, _timeout: Duration) -> anyhow::Result<PathBuf> {
            Ok(PathBuf::from("/tmp/stub-payload.mkv"))
        }

        async fn remove(&self, _task_id: Uuid, _path: &Path) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FailingTorrentClient;

    #[async_trait]
    impl TorrentClient for FailingTorrentClient {
        async fn fetch(&self, _task_id: Uuid, _magnet_uri: &str, _timeout: Duration) -> anyhow::Result<PathBuf> {
            anyhow::bail!("tracker unreachable")
        }

        async fn remove(&self, _task_id: Uuid, _path: &Path) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stub_torrent_client_fetches_a_path() {
        let client = StubTorrentClient;
        let result = client
            .fetch(Uuid::new_v4(), "magnet:?xt=urn:btih:demo", Duration::from_secs(1))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failing_torrent_client_surfaces_its_error() {
        let client = FailingTorrentClient;
        let result = client
            .fetch(Uuid::new_v4(), "magnet:?xt=urn:btih:demo", Duration::from_secs(1))
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("tracker unreachable"));
    }
}
