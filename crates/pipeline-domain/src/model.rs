//! Domain entities shared across every pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Type;
use uuid::Uuid;

/// Availability lifecycle of a tracked piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "video_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Discovered by the crawl ingester but not yet queued for download.
    Discovered,
    /// A download task is actively fetching the payload.
    Downloading,
    /// The payload is on disk awaiting upload.
    Downloaded,
    /// An upload task is actively pushing the payload.
    Uploading,
    /// A share URL has been resolved to a CDN URL and can be served.
    Available,
    /// The resolved share URL has aged past the freshness window.
    Expired,
    /// The pipeline gave up on this video.
    Failed,
}

/// Lifecycle state of a unit of work flowing through the queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "task_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting to be dispatched by the orchestrator.
    Pending,
    /// The download stage is fetching the torrent payload.
    Downloading,
    /// The download stage is stream-copying into a streaming-friendly container.
    Remuxing,
    /// The upload stage is pushing the payload to the photo service.
    Uploading,
    /// The upload stage is waiting for the share URL to become reachable.
    Verifying,
    /// Terminal success state.
    Complete,
    /// Terminal failure state.
    Failed,
}

impl TaskState {
    /// Transient states that orphan GC reclaims when stuck too long.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Downloading | Self::Remuxing | Self::Uploading | Self::Verifying
        )
    }

    /// Non-terminal states that count toward the "open task" invariant.
    #[must_use]
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Complete | Self::Failed)
    }
}

/// Health state of an upload credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "account_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Eligible for selection by the scheduler.
    Active,
    /// Temporarily ineligible; will reactivate once `cooldown_until` passes.
    Cooldown,
    /// Permanently ineligible; requires operator intervention.
    Banned,
    /// Newly provisioned; not yet eligible until verified out-of-band.
    Unverified,
}

/// A piece of content tracked from discovery through availability.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Video {
    /// Primary identifier.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Magnet URI used to fetch the payload, when known.
    pub magnet_uri: Option<String>,
    /// Lowercased hex info-hash; the de-duplication key.
    pub info_hash: Option<String>,
    /// Local filesystem path once downloaded.
    pub local_path: Option<String>,
    /// Share URL produced by the upload stage.
    pub share_url: Option<String>,
    /// CDN URL resolved from the share URL.
    pub cdn_url: Option<String>,
    /// Current lifecycle status.
    pub status: VideoStatus,
    /// Free-form metadata document.
    pub metadata_json: Option<Value>,
    /// Ordered short tags.
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Video {
    /// Construct a new, unsaved video in the `discovered` state.
    #[must_use]
    pub fn new(title: impl Into<String>, magnet_uri: impl Into<String>) -> Self {
        let magnet_uri = magnet_uri.into();
        let info_hash = extract_info_hash(&magnet_uri);
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            magnet_uri: Some(magnet_uri),
            info_hash,
            local_path: None,
            share_url: None,
            cdn_url: None,
            status: VideoStatus::Discovered,
            metadata_json: None,
            tags: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Parse the lowercased hex info-hash out of a BitTorrent magnet URI.
#[must_use]
pub(crate) fn extract_info_hash(magnet_uri: &str) -> Option<String> {
    magnet_uri.split('&').find_map(|segment| {
        segment
            .strip_prefix("xt=urn:btih:")
            .or_else(|| segment.strip_prefix("magnet:?xt=urn:btih:"))
            .map(str::to_lowercase)
    })
}

/// A unit of work flowing through the named queues.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Primary identifier.
    pub id: Uuid,
    /// The video this task operates on.
    pub video_id: Uuid,
    /// Upload credential bound to this task, once assigned.
    pub account_id: Option<Uuid>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Queue this task currently belongs to (or most recently belonged to).
    pub queue_name: String,
    /// Stage output: local path once downloaded.
    pub local_path: Option<String>,
    /// Stage output: share URL once uploaded.
    pub share_url: Option<String>,
    /// Number of retries consumed so far.
    pub retries: i32,
    /// Maximum retries before the task moves to the dead-letter queue.
    pub max_retries: i32,
    /// Last recorded error, if any.
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Construct a new pending task routed to `queue_name`.
    #[must_use]
    pub fn new(video_id: Uuid, queue_name: impl Into<String>, max_retries: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_id,
            account_id: None,
            state: TaskState::Pending,
            queue_name: queue_name.into(),
            local_path: None,
            share_url: None,
            retries: 0,
            max_retries,
            error_message: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Whether another retry is permitted after the current attempt.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.retries < self.max_retries
    }
}

/// An upload credential managed by the LRU account scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    /// Primary identifier.
    pub id: Uuid,
    /// Credential email.
    pub email: String,
    /// Current health status.
    pub status: AccountStatus,
    /// Timestamp the account was last handed out and released.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Cooldown expiry, when in cooldown.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Lease expiry while held by a worker.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Bytes uploaded so far in the current quota day.
    pub daily_uploaded_bytes: i64,
    /// Daily upload allowance.
    pub daily_quota_bytes: i64,
    /// When the daily counter next rolls over.
    pub quota_reset_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_info_hash_parses_magnet_query() {
        let magnet = "magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01&dn=demo";
        assert_eq!(
            extract_info_hash(magnet).as_deref(),
            Some("abcdef0123456789abcdef0123456789abcdef01")
        );
    }

    #[test]
    fn extract_info_hash_returns_none_without_btih() {
        assert!(extract_info_hash("magnet:?dn=demo").is_none());
    }

    #[test]
    fn new_video_starts_discovered_with_info_hash() {
        let video = Video::new("demo", "magnet:?xt=urn:btih:deadbeef");
        assert_eq!(video.status, VideoStatus::Discovered);
        assert_eq!(video.info_hash.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn task_can_retry_respects_max_retries() {
        let mut task = Task::new(Uuid::new_v4(), "pipeline:download", 2);
        assert!(task.can_retry());
        task.retries = 2;
        assert!(!task.can_retry());
    }

    #[test]
    fn task_state_classifies_transient_and_open() {
        assert!(TaskState::Downloading.is_transient());
        assert!(!TaskState::Pending.is_transient());
        assert!(TaskState::Pending.is_open());
        assert!(!TaskState::Complete.is_open());
    }
}
