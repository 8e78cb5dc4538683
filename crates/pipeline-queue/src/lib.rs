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

//! Redis-backed FIFO queues for the ingestion pipeline.
//!
//! Every queue is a Redis list addressed by name; `push`/`pop` map onto
//! `RPUSH`/`BLPOP` so ordering is FIFO per queue with no cross-queue
//! ordering guarantee. The broker carries no acknowledgement protocol — a
//! popped payload is owned by the popping worker, and durability is
//! recovered through the task row in the store rather than through Redis
//! itself (see the orchestrator's orphan sweep).

mod error;
mod lock;
mod payload;
mod replay;

pub use error::{QueueError, QueueResult};
pub use lock::LockToken;
pub use payload::{DlqPayload, QueuePayload, queues};

use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

fn pause_key(queue_name: &str) -> String {
    format!("{queue_name}:paused")
}

fn lock_key(task_id: uuid::Uuid) -> String {
    format!("pipeline:upload-lock:{task_id}")
}

/// A connection to the Redis-backed queue broker.
///
/// Cheaply cloned: [`redis::aio::ConnectionManager`] multiplexes commands
/// over a single managed connection and reconnects transparently.
#[derive(Clone)]
pub struct Broker {
    conn: ConnectionManager,
}

impl Broker {
    /// Connect to Redis at `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Redis`] if the connection cannot be established.
    pub async fn connect(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url).map_err(|source| QueueError::Redis {
            operation: "broker.connect",
            source,
        })?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|source| QueueError::Redis {
                operation: "broker.connect",
                source,
            })?;
        Ok(Self { conn })
    }

    /// Append `payload` to the tail of `queue_name`. Returns the new queue depth.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if encoding or the Redis command fails.
    pub async fn push(&self, queue_name: &str, payload: &QueuePayload) -> QueueResult<i64> {
        let mut conn = self.conn.clone();
        Self::push_raw(&mut conn, queue_name, payload).await?;
        self.length(queue_name).await
    }

    pub(crate) async fn push_raw(
        conn: &mut ConnectionManager,
        queue_name: &str,
        payload: &QueuePayload,
    ) -> QueueResult<()> {
        let encoded = serde_json::to_string(payload).map_err(|source| QueueError::Codec {
            operation: "push",
            source,
        })?;
        conn.rpush::<_, _, ()>(queue_name, encoded)
            .await
            .map_err(|source| QueueError::Redis {
                operation: "push",
                source,
            })
    }

    /// Append `payload` to the tail of a dead-letter queue. Returns the new queue depth.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if encoding or the Redis command fails.
    pub async fn push_dlq(&self, dlq_queue_name: &str, payload: &DlqPayload) -> QueueResult<i64> {
        let encoded = serde_json::to_string(payload).map_err(|source| QueueError::Codec {
            operation: "push_dlq",
            source,
        })?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(dlq_queue_name, encoded)
            .await
            .map_err(|source| QueueError::Redis {
                operation: "push_dlq",
                source,
            })?;
        self.length(dlq_queue_name).await
    }

    /// Block up to `timeout` waiting for an item on `queue_name`.
    ///
    /// Returns `None` on timeout, `Some(payload)` on success. Malformed
    /// entries are logged and treated as a timeout rather than propagated,
    /// since a poison-pill payload must never wedge the consumer loop.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Redis`] if the underlying command fails.
    pub async fn pop(&self, queue_name: &str, timeout: Duration) -> QueueResult<Option<QueuePayload>> {
        let mut conn = self.conn.clone();
        let response: Option<(String, String)> = conn
            .blpop(queue_name, timeout.as_secs_f64())
            .await
            .map_err(|source| QueueError::Redis {
                operation: "pop",
                source,
            })?;

        let Some((_, encoded)) = response else {
            return Ok(None);
        };

        match serde_json::from_str(&encoded) {
            Ok(payload) => Ok(Some(payload)),
            Err(source) => {
                tracing::error!(%queue_name, error = %source, "dropping undecodable queue entry");
                Ok(None)
            }
        }
    }

    /// Append an arbitrary JSON-serializable value to the tail of `queue_name`.
    /// Used for payload shapes the broker doesn't model directly, such as
    /// discovery-queue entries.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if encoding or the Redis command fails.
    pub async fn push_json<T: serde::Serialize + Sync>(&self, queue_name: &str, value: &T) -> QueueResult<i64> {
        let encoded = serde_json::to_string(value).map_err(|source| QueueError::Codec {
            operation: "push_json",
            source,
        })?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(queue_name, encoded)
            .await
            .map_err(|source| QueueError::Redis {
                operation: "push_json",
                source,
            })?;
        self.length(queue_name).await
    }

    /// Block up to `timeout` waiting for an arbitrary JSON-deserializable value on `queue_name`.
    ///
    /// Like [`Broker::pop`], a malformed entry is logged and treated as a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Redis`] if the underlying command fails.
    pub async fn pop_json<T: serde::de::DeserializeOwned>(
        &self,
        queue_name: &str,
        timeout: Duration,
    ) -> QueueResult<Option<T>> {
        let mut conn = self.conn.clone();
        let response: Option<(String, String)> = conn
            .blpop(queue_name, timeout.as_secs_f64())
            .await
            .map_err(|source| QueueError::Redis {
                operation: "pop_json",
                source,
            })?;

        let Some((_, encoded)) = response else {
            return Ok(None);
        };

        match serde_json::from_str(&encoded) {
            Ok(value) => Ok(Some(value)),
            Err(source) => {
                tracing::error!(%queue_name, error = %source, "dropping undecodable queue entry");
                Ok(None)
            }
        }
    }

    /// Current depth of `queue_name`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Redis`] if the command fails.
    pub async fn length(&self, queue_name: &str) -> QueueResult<i64> {
        let mut conn = self.conn.clone();
        conn.llen(queue_name)
            .await
            .map_err(|source| QueueError::Redis {
                operation: "length",
                source,
            })
    }

    /// Set or clear the pause gate for `queue_name`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Redis`] if the command fails.
    pub async fn set_paused(&self, queue_name: &str, paused: bool) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        if paused {
            conn.set::<_, _, ()>(pause_key(queue_name), 1)
                .await
                .map_err(|source| QueueError::Redis {
                    operation: "set_paused",
                    source,
                })
        } else {
            conn.del::<_, ()>(pause_key(queue_name))
                .await
                .map_err(|source| QueueError::Redis {
                    operation: "set_paused",
                    source,
                })
        }
    }

    /// Whether `queue_name` is currently paused.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Redis`] if the command fails.
    pub async fn is_paused(&self, queue_name: &str) -> QueueResult<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(pause_key(queue_name))
            .await
            .map_err(|source| QueueError::Redis {
                operation: "is_paused",
                source,
            })?;
        Ok(exists)
    }

    /// Schedule `payload` for replay onto `queue_name` once `ready_at` passes.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if encoding or the Redis command fails.
    pub async fn schedule_replay(
        &self,
        queue_name: &str,
        payload: &QueuePayload,
        ready_at: DateTime<Utc>,
    ) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        replay::schedule(&mut conn, queue_name, payload, ready_at).await
    }

    /// Move every due delayed-replay entry back onto `queue_name`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Redis`] if a command fails.
    pub async fn replay_due(&self, queue_name: &str) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        replay::replay_due(&mut conn, queue_name).await
    }

    /// Attempt to acquire the single-flight lock for `task_id`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Redis`] if the command fails.
    pub async fn try_acquire_lock(
        &self,
        task_id: uuid::Uuid,
        ttl: Duration,
    ) -> QueueResult<Option<LockToken>> {
        let mut conn = self.conn.clone();
        lock::try_acquire(&mut conn, &lock_key(task_id), ttl.as_secs()).await
    }

    /// Release the single-flight lock for `task_id` if still held by `token`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Redis`] if the command fails.
    pub async fn release_lock(&self, task_id: uuid::Uuid, token: &LockToken) -> QueueResult<bool> {
        let mut conn = self.conn.clone();
        lock::release(&mut conn, &lock_key(task_id), token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_key_is_namespaced_under_the_queue() {
        assert_eq!(pause_key(queues::UPLOAD), "pipeline:upload:paused");
    }

    #[test]
    fn lock_key_is_namespaced_under_the_task() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            lock_key(id),
            "pipeline:upload-lock:00000000-0000-0000-0000-000000000000"
        );
    }
}
