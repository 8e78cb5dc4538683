//! Wire shape for items carried on the named queues.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of dispatch work, mirroring the corresponding `Task` row.
///
/// The queue never interprets this payload beyond JSON-encoding it; the
/// task row in the store remains the durable source of truth, so a payload
/// lost to a crash is recovered by the orchestrator's orphan sweep rather
/// than by any acknowledgement protocol here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePayload {
    /// Task this payload represents.
    pub task_id: Uuid,
    /// Video the task operates on.
    pub video_id: Uuid,
    /// Queue this payload was dispatched onto.
    pub queue_name: String,
    /// Retries already consumed.
    pub retries: u32,
    /// Retries permitted before the item moves to the dead-letter queue.
    pub max_retries: u32,
    /// Upload credential bound to the task, once assigned.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub account_id: Option<Uuid>,
    /// Local filesystem path, once the download stage has produced one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub local_path: Option<String>,
}

impl QueuePayload {
    /// Construct a fresh, zero-retry payload for `task_id`/`video_id` on `queue_name`.
    #[must_use]
    pub fn new(task_id: Uuid, video_id: Uuid, queue_name: impl Into<String>, max_retries: u32) -> Self {
        Self {
            task_id,
            video_id,
            queue_name: queue_name.into(),
            retries: 0,
            max_retries,
            account_id: None,
            local_path: None,
        }
    }

    /// Whether another attempt is allowed after this one fails.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.retries < self.max_retries
    }

    /// Return a copy with the retry counter incremented.
    #[must_use]
    pub fn with_incremented_retries(&self) -> Self {
        let mut next = self.clone();
        next.retries += 1;
        next
    }
}

/// A payload moved to a stage's dead-letter queue after exhausting retries
/// or failing in a non-retryable way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlqPayload {
    /// Task this payload represents.
    pub task_id: Uuid,
    /// Video the task operates on.
    pub video_id: Uuid,
    /// Stage that produced the failure (`"download"` or `"upload"`).
    pub stage: String,
    /// Attempts consumed before landing in the dead-letter queue.
    pub attempts: u32,
    /// Human-readable failure description.
    pub error_message: String,
    /// Unix timestamp of the failure.
    pub failed_at: i64,
    /// Number of times this entry has already been replayed back onto the live queue.
    #[serde(default)]
    pub dlq_replays: u32,
}

/// Well-known queue names used by the pipeline.
pub mod queues {
    /// Discovery payloads produced by the crawl ingester.
    pub const DISCOVERY: &str = "pipeline:discovery";
    /// Download-stage work.
    pub const DOWNLOAD: &str = "pipeline:download";
    /// Upload-stage work.
    pub const UPLOAD: &str = "pipeline:upload";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_payload_starts_at_zero_retries() {
        let payload = QueuePayload::new(Uuid::nil(), Uuid::nil(), queues::DOWNLOAD, 3);
        assert_eq!(payload.retries, 0);
        assert!(payload.can_retry());
    }

    #[test]
    fn incrementing_retries_does_not_mutate_original() {
        let payload = QueuePayload::new(Uuid::nil(), Uuid::nil(), queues::UPLOAD, 1);
        let bumped = payload.with_incremented_retries();
        assert_eq!(payload.retries, 0);
        assert_eq!(bumped.retries, 1);
        assert!(!bumped.can_retry());
    }

    #[test]
    fn round_trips_through_json_without_optional_fields() {
        let payload = QueuePayload::new(Uuid::nil(), Uuid::nil(), queues::DOWNLOAD, 3);
        let encoded = serde_json::to_string(&payload).expect("encode");
        assert!(!encoded.contains("account_id"));
        let decoded: QueuePayload = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, payload);
    }
}
