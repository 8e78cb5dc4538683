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

//! LRU upload-account scheduler.
//!
//! `next_account` reactivates any account whose cooldown has lapsed, then
//! claims the least-recently-used eligible row under `FOR UPDATE SKIP
//! LOCKED` so concurrent schedulers never hand out the same credential.
//! The claimed row is leased rather than immediately marked used, so a
//! worker that crashes mid-upload releases the account automatically once
//! the lease expires.

mod error;

pub use error::{SchedulerError, SchedulerResult};

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

fn db_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> SchedulerError {
    move |source| SchedulerError::Database { operation, source }
}

/// Selects and accounts for upload credentials against a shared pool.
#[derive(Clone)]
pub struct AccountScheduler {
    pool: PgPool,
}

impl AccountScheduler {
    /// Build a scheduler over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Select the least-recently-used eligible account and lease it for `lease_duration`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoActiveAccounts`] if no account currently
    /// satisfies the active/quota/lease contract, or
    /// [`SchedulerError::Database`] for any other failure.
    pub async fn next_account(&self, lease_duration: Duration) -> SchedulerResult<Uuid> {
        let mut tx = self.pool.begin().await.map_err(db_err("next_account.begin"))?;

        sqlx::query(
            r"
            UPDATE accounts
               SET status = 'active',
                   cooldown_until = NULL,
                   lease_expires_at = NULL,
                   daily_uploaded_bytes = 0,
                   quota_reset_at = date_trunc('day', now()) + interval '1 day'
             WHERE status = 'cooldown' AND cooldown_until <= now()
            ",
        )
        .execute(&mut *tx)
        .await
        .map_err(db_err("next_account.reactivate_cooldowns"))?;

        let claimed: Option<Uuid> = sqlx::query_scalar(
            r"
            WITH candidate AS (
                SELECT id
                  FROM accounts
                 WHERE status = 'active'
                   AND (cooldown_until IS NULL OR cooldown_until <= now())
                   AND (lease_expires_at IS NULL OR lease_expires_at <= now())
                   AND (quota_reset_at <= now() OR daily_uploaded_bytes < daily_quota_bytes)
                 ORDER BY last_used_at ASC NULLS FIRST
                 LIMIT 1
                   FOR UPDATE SKIP LOCKED
            )
            UPDATE accounts a
               SET lease_expires_at = now() + ($1 || ' seconds')::interval
              FROM candidate
             WHERE a.id = candidate.id
            RETURNING a.id
            ",
        )
        .bind(lease_duration.as_secs().to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("next_account.claim"))?;

        tx.commit().await.map_err(db_err("next_account.commit"))?;

        claimed.ok_or(SchedulerError::NoActiveAccounts)
    }

    /// Record that `id` finished a successful handoff: stamp `last_used_at`
    /// and clear the lease so it becomes eligible for reselection.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Database`] if the update fails.
    pub async fn mark_used(&self, id: Uuid) -> SchedulerResult<()> {
        sqlx::query("UPDATE accounts SET last_used_at = $1, lease_expires_at = NULL WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err("mark_used"))?;
        Ok(())
    }

    /// Add `bytes` to the account's daily upload counter, rolling the
    /// counter over if the quota day has elapsed, and move the account to
    /// `cooldown` once the counter reaches its quota.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Database`] if the update fails.
    pub async fn apply_upload_usage(&self, id: Uuid, bytes: i64) -> SchedulerResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("apply_upload_usage.begin"))?;

        let row: (i64, i64, chrono::DateTime<Utc>) = sqlx::query_as(
            r"
            UPDATE accounts
               SET daily_uploaded_bytes = CASE
                       WHEN quota_reset_at <= now() THEN $2
                       ELSE daily_uploaded_bytes + $2
                   END,
                   quota_reset_at = CASE
                       WHEN quota_reset_at <= now() THEN date_trunc('day', now()) + interval '1 day'
                       ELSE quota_reset_at
                   END
             WHERE id = $1
            RETURNING daily_uploaded_bytes, daily_quota_bytes, quota_reset_at
            ",
        )
        .bind(id)
        .bind(bytes)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("apply_upload_usage.update_counter"))?;

        let (uploaded, quota, quota_reset_at) = row;
        if uploaded >= quota {
            sqlx::query(
                "UPDATE accounts SET status = 'cooldown', cooldown_until = $1 WHERE id = $2",
            )
            .bind(quota_reset_at)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("apply_upload_usage.enter_cooldown"))?;
        }

        tx.commit().await.map_err(db_err("apply_upload_usage.commit"))?;
        Ok(())
    }

    /// Count accounts currently `active`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Database`] if the query fails.
    pub async fn active_count(&self) -> SchedulerResult<i64> {
        sqlx::query_scalar("SELECT count(*) FROM accounts WHERE status = 'active'")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("active_count"))
    }
}
