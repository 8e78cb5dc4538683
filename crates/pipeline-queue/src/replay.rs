//! Delayed-replay sorted set backing retry-with-backoff and DLQ replay.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;

use crate::error::{QueueError, QueueResult};
use crate::payload::QueuePayload;

fn replay_key(queue_name: &str) -> String {
    format!("{queue_name}:replay")
}

/// Schedule `payload` to be pushed back onto `queue_name` once `ready_at` passes.
///
/// # Errors
///
/// Returns [`QueueError`] if encoding or the Redis command fails.
pub(crate) async fn schedule(
    conn: &mut ConnectionManager,
    queue_name: &str,
    payload: &QueuePayload,
    ready_at: DateTime<Utc>,
) -> QueueResult<()> {
    let encoded = serde_json::to_string(payload).map_err(|source| QueueError::Codec {
        operation: "replay.schedule",
        source,
    })?;

    redis::cmd("ZADD")
        .arg(replay_key(queue_name))
        .arg(ready_at.timestamp())
        .arg(encoded)
        .query_async::<()>(conn)
        .await
        .map_err(|source| QueueError::Redis {
            operation: "replay.schedule",
            source,
        })
}

/// Move every item whose `ready_at` has passed back onto `queue_name`.
/// Returns the number of items replayed.
///
/// # Errors
///
/// Returns [`QueueError`] if a Redis command fails. Decode failures for an
/// individual entry are logged and the entry is dropped rather than
/// aborting the whole sweep.
pub(crate) async fn replay_due(conn: &mut ConnectionManager, queue_name: &str) -> QueueResult<u64> {
    let key = replay_key(queue_name);
    let now = Utc::now().timestamp();

    let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
        .arg(&key)
        .arg("-inf")
        .arg(now)
        .query_async(conn)
        .await
        .map_err(|source| QueueError::Redis {
            operation: "replay.collect_due",
            source,
        })?;

    let mut replayed = 0_u64;
    for encoded in due {
        let removed: i64 = redis::cmd("ZREM")
            .arg(&key)
            .arg(&encoded)
            .query_async(conn)
            .await
            .map_err(|source| QueueError::Redis {
                operation: "replay.remove_due",
                source,
            })?;
        if removed == 0 {
            continue;
        }

        match serde_json::from_str::<QueuePayload>(&encoded) {
            Ok(payload) => {
                crate::Broker::push_raw(conn, queue_name, &payload).await?;
                replayed += 1;
            }
            Err(source) => {
                tracing::error!(%queue_name, error = %source, "dropping undecodable replay entry");
            }
        }
    }

    Ok(replayed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_key_is_namespaced_under_the_queue() {
        assert_eq!(replay_key("pipeline:upload"), "pipeline:upload:replay");
    }
}
