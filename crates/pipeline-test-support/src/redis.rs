//! Helper for running integration tests against a real Redis instance.

/// Start a disposable [`Broker`](pipeline_queue::Broker) connection via
/// [`start_redis`], binding it to `$broker`, or print a skip notice naming
/// `$test` and return `Ok(())` early if no Redis instance is reachable.
#[macro_export]
macro_rules! skip_without_redis {
    ($test:expr) => {
        match $crate::redis::start_redis().await {
            Ok(broker) => broker,
            Err(err) => {
                eprintln!("skipping {}: {err}", $test);
                return Ok(());
            }
        }
    };
}

use anyhow::{Context, Result};
use pipeline_queue::Broker;

/// Connect to the Redis instance named by `PIPELINE_TEST_REDIS_URL`, falling
/// back to the conventional local default. Integration tests that need a
/// real broker call this and skip themselves when nothing answers, the same
/// way Postgres-backed tests skip without a database.
///
/// # Errors
///
/// Returns an error if no Redis instance is reachable at the resolved URL.
pub async fn start_redis() -> Result<Broker> {
    let url = std::env::var("PIPELINE_TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    Broker::connect(&url).await.with_context(|| format!("connect to redis at {url}"))
}
