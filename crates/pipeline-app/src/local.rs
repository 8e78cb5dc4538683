//! Local-mode collaborator implementations.
//!
//! These back `pipeline_config::PixelInjectorMode::Local` and the default
//! development/test deployment: no real torrent engine, container runtime,
//! or upload endpoint is involved. A production deployment substitutes its
//! own adapters behind the same traits in `pipeline-stages`; this crate only
//! ships the local doubles, matching the teacher's split between a real
//! engine and a stub used where the real one isn't available.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use pipeline_stages::{ContainerRuntime, FileUploader, MetadataProvider, RuntimeHandle, ShareVerifier, TorrentClient, Transcoder};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// Fetches torrents by synthesizing an empty payload file under `media_root`,
/// standing in for a completed download with no real BitTorrent engine.
pub(crate) struct LocalTorrentClient {
    media_root: PathBuf,
}

impl LocalTorrentClient {
    /// Build a client that writes synthesized payloads under `media_root`.
    #[must_use]
    pub(crate) const fn new(media_root: PathBuf) -> Self {
        Self { media_root }
    }
}

#[async_trait]
impl TorrentClient for LocalTorrentClient {
    async fn fetch(&self, task_id: Uuid, magnet_uri: &str, _timeout: Duration) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.media_root).await?;
        let path = self.media_root.join(format!("{task_id}.payload"));
        tokio::fs::write(&path, magnet_uri.as_bytes()).await?;
        info!(%task_id, path = %path.display(), "local torrent client synthesized a completed download");
        Ok(path)
    }

    async fn remove(&self, task_id: Uuid, path: &Path) -> anyhow::Result<()> {
        if let Err(source) = tokio::fs::remove_file(path).await
            && source.kind() != std::io::ErrorKind::NotFound
        {
            return Err(source.into());
        }
        info!(%task_id, "local torrent client removed its synthesized payload");
        Ok(())
    }
}

/// Remuxes by copying the input byte-for-byte to a `.mp4`-suffixed sibling,
/// standing in for a real container change.
pub(crate) struct LocalTranscoder;

#[async_trait]
impl Transcoder for LocalTranscoder {
    async fn remux(&self, task_id: Uuid, input: &Path) -> anyhow::Result<PathBuf> {
        let output = input.with_extension("mp4");
        tokio::fs::copy(input, &output).await?;
        info!(%task_id, output = %output.display(), "local transcoder copied the payload in place of a remux");
        Ok(output)
    }
}

/// Never produces metadata; the download stage already treats `None` as success.
pub(crate) struct LocalMetadataProvider;

#[async_trait]
impl MetadataProvider for LocalMetadataProvider {
    async fn probe(&self, _task_id: Uuid, _path: &Path) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }
}

/// Opaque handle for a runtime that was never really provisioned.
pub(crate) struct LocalRuntimeHandle(String);

impl RuntimeHandle for LocalRuntimeHandle {
    fn id(&self) -> &str {
        &self.0
    }
}

/// Skips container provisioning entirely; `provision` returns immediately.
pub(crate) struct LocalContainerRuntime;

#[async_trait]
impl ContainerRuntime for LocalContainerRuntime {
    async fn provision(&self, task_id: Uuid, _ready_timeout: Duration) -> anyhow::Result<Box<dyn RuntimeHandle>> {
        Ok(Box::new(LocalRuntimeHandle(format!("local-{task_id}"))))
    }

    async fn destroy(&self, handle: &dyn RuntimeHandle) -> anyhow::Result<()> {
        info!(handle = handle.id(), "local container runtime skipped teardown, nothing was provisioned");
        Ok(())
    }
}

/// Synthesizes a share URL from the local file path instead of pushing it
/// through a real upload endpoint.
pub(crate) struct LocalFileUploader {
    share_scheme: String,
}

impl LocalFileUploader {
    /// Build an uploader that prefixes synthesized URLs with `share_scheme`.
    #[must_use]
    pub(crate) const fn new(share_scheme: String) -> Self {
        Self { share_scheme }
    }
}

#[async_trait]
impl FileUploader for LocalFileUploader {
    async fn upload(
        &self,
        task_id: Uuid,
        _runtime: &dyn RuntimeHandle,
        local_path: &Path,
        _verify_timeout: Duration,
    ) -> anyhow::Result<String> {
        let share_url = format!("{}://{}", self.share_scheme, local_path.display());
        info!(%task_id, %share_url, "local file uploader synthesized a share url");
        Ok(share_url)
    }
}

/// Always reports the synthesized share URL as reachable.
pub(crate) struct LocalShareVerifier;

#[async_trait]
impl ShareVerifier for LocalShareVerifier {
    async fn verify(&self, _share_url: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_torrent_client_writes_and_removes_a_payload() {
        let dir = std::env::temp_dir().join(format!("pipeline-app-test-{}", Uuid::new_v4()));
        let client = LocalTorrentClient::new(dir.clone());
        let task_id = Uuid::new_v4();
        let path = client
            .fetch(task_id, "magnet:?xt=urn:btih:demo", Duration::from_secs(1))
            .await
            .expect("fetch succeeds");
        assert!(path.exists());
        client.remove(task_id, &path).await.expect("remove succeeds");
        assert!(!path.exists());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn local_file_uploader_prefixes_the_share_scheme() {
        let uploader = LocalFileUploader::new("local".to_string());
        let handle = LocalRuntimeHandle("local-test".to_string());
        let share_url = uploader
            .upload(Uuid::new_v4(), &handle, Path::new("/tmp/demo.mp4"), Duration::from_secs(1))
            .await
            .expect("upload succeeds");
        assert_eq!(share_url, "local:///tmp/demo.mp4");
    }

    #[tokio::test]
    async fn local_share_verifier_always_succeeds() {
        assert!(LocalShareVerifier.verify("local:///tmp/demo.mp4").await.unwrap());
    }
}
