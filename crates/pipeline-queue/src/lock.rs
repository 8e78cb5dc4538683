//! Single-flight lock: at most one worker may hold a named key at a time.

use rand::Rng;
use redis::aio::ConnectionManager;

use crate::error::{QueueError, QueueResult};

/// A release token returned by [`try_acquire`]. Dropping it without calling
/// [`release`] simply leaves the lock to expire on its TTL.
#[derive(Debug, Clone)]
pub struct LockToken(String);

/// Attempt to acquire `key` for `ttl_seconds`, returning a token on success.
///
/// Uses `SET key token NX EX ttl`, so acquisition is a single atomic Redis
/// command: a racing worker's `SET NX` simply fails.
///
/// # Errors
///
/// Returns [`QueueError::Redis`] if the command fails.
pub(crate) async fn try_acquire(
    conn: &mut ConnectionManager,
    key: &str,
    ttl_seconds: u64,
) -> QueueResult<Option<LockToken>> {
    let token: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();

    let acquired: bool = redis::cmd("SET")
        .arg(key)
        .arg(&token)
        .arg("NX")
        .arg("EX")
        .arg(ttl_seconds)
        .query_async::<Option<String>>(conn)
        .await
        .map_err(|source| QueueError::Redis {
            operation: "lock.acquire",
            source,
        })?
        .is_some();

    Ok(acquired.then_some(LockToken(token)))
}

/// Release `key` only if it is still held by `token` (compare-and-delete),
/// so a worker never releases a lock another worker has since acquired.
///
/// # Errors
///
/// Returns [`QueueError::Redis`] if the script fails to execute.
pub(crate) async fn release(conn: &mut ConnectionManager, key: &str, token: &LockToken) -> QueueResult<bool> {
    const SCRIPT: &str = r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        else
            return 0
        end
    ";

    let deleted: i64 = redis::Script::new(SCRIPT)
        .key(key)
        .arg(&token.0)
        .invoke_async(conn)
        .await
        .map_err(|source| QueueError::Redis {
            operation: "lock.release",
            source,
        })?;

    Ok(deleted == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_not_empty() {
        let token = LockToken("abc".to_string());
        assert_eq!(token.0, "abc");
    }
}
