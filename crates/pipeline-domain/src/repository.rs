//! Direct-SQL repositories for videos, tasks and accounts.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::model::{Account, Task, TaskState, Video, VideoStatus};

fn db_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DomainError {
    move |source| DomainError::Database { operation, source }
}

/// CRUD operations over the `videos` table.
pub struct VideoRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> VideoRepository<'a> {
    pub(crate) const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new video row and return the persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::DuplicateInfoHash`] if the info-hash is already
    /// tracked, or [`DomainError::Database`] for any other failure.
    pub async fn insert(&self, video: &Video) -> DomainResult<Video> {
        sqlx::query_as::<_, Video>(
            r"
            INSERT INTO videos (id, title, magnet_uri, info_hash, local_path, share_url,
                                 cdn_url, status, metadata_json, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            ",
        )
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.magnet_uri)
        .bind(&video.info_hash)
        .bind(&video.local_path)
        .bind(&video.share_url)
        .bind(&video.cdn_url)
        .bind(video.status)
        .bind(&video.metadata_json)
        .bind(&video.tags)
        .bind(video.created_at)
        .bind(video.updated_at)
        .fetch_one(self.pool)
        .await
        .map_err(|source| {
            if let sqlx::Error::Database(ref db_err) = source
                && db_err.is_unique_violation()
            {
                return DomainError::DuplicateInfoHash {
                    info_hash: video.info_hash.clone().unwrap_or_default(),
                };
            }
            DomainError::Database {
                operation: "videos.insert",
                source,
            }
        })
    }

    /// Fetch a video by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the query fails.
    pub async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Video>> {
        sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(db_err("videos.find_by_id"))
    }

    /// Fetch a video by its de-duplication key.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the query fails.
    pub async fn find_by_info_hash(&self, info_hash: &str) -> DomainResult<Option<Video>> {
        sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE info_hash = $1")
            .bind(info_hash)
            .fetch_optional(self.pool)
            .await
            .map_err(db_err("videos.find_by_info_hash"))
    }

    /// Update a video's status and bump `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn update_status(&self, id: Uuid, status: VideoStatus) -> DomainResult<()> {
        sqlx::query("UPDATE videos SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(db_err("videos.update_status"))?;
        Ok(())
    }

    /// Persist the local filesystem path produced by the download stage.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn set_local_path(&self, id: Uuid, local_path: &str) -> DomainResult<()> {
        sqlx::query("UPDATE videos SET local_path = $1, updated_at = $2 WHERE id = $3")
            .bind(local_path)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(db_err("videos.set_local_path"))?;
        Ok(())
    }

    /// Persist metadata discovered about the video.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn set_metadata(&self, id: Uuid, metadata: serde_json::Value) -> DomainResult<()> {
        sqlx::query("UPDATE videos SET metadata_json = $1, updated_at = $2 WHERE id = $3")
            .bind(metadata)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(db_err("videos.set_metadata"))?;
        Ok(())
    }

    /// Persist the share URL produced by the upload stage and mark the video available.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn set_share_url(&self, id: Uuid, share_url: &str) -> DomainResult<()> {
        sqlx::query(
            "UPDATE videos SET share_url = $1, status = 'available', updated_at = $2 WHERE id = $3",
        )
        .bind(share_url)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(db_err("videos.set_share_url"))?;
        Ok(())
    }

    /// Persist the resolved CDN URL and mark the video available.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn set_cdn_url(&self, id: Uuid, cdn_url: &str) -> DomainResult<()> {
        sqlx::query(
            "UPDATE videos SET cdn_url = $1, status = 'available', updated_at = $2 WHERE id = $3",
        )
        .bind(cdn_url)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(db_err("videos.set_cdn_url"))?;
        Ok(())
    }

    /// Mark every `available` video whose `updated_at` predates the freshness window
    /// as `expired`. Returns the number of rows touched.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn expire_stale(&self, max_age_seconds: i64) -> DomainResult<u64> {
        let result = sqlx::query(
            r"
            UPDATE videos
               SET status = 'expired', updated_at = now()
             WHERE status = 'available'
               AND share_url IS NOT NULL
               AND updated_at < now() - ($1 || ' seconds')::interval
            ",
        )
        .bind(max_age_seconds.to_string())
        .execute(self.pool)
        .await
        .map_err(db_err("videos.expire_stale"))?;
        Ok(result.rows_affected())
    }
}

/// CRUD operations over the `tasks` table.
pub struct TaskRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TaskRepository<'a> {
    pub(crate) const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new task row.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the insert fails.
    pub async fn insert(&self, task: &Task) -> DomainResult<Task> {
        sqlx::query_as::<_, Task>(
            r"
            INSERT INTO tasks (id, video_id, account_id, state, queue_name, local_path,
                                share_url, retries, max_retries, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            ",
        )
        .bind(task.id)
        .bind(task.video_id)
        .bind(task.account_id)
        .bind(task.state)
        .bind(&task.queue_name)
        .bind(&task.local_path)
        .bind(&task.share_url)
        .bind(task.retries)
        .bind(task.max_retries)
        .bind(&task.error_message)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(self.pool)
        .await
        .map_err(db_err("tasks.insert"))
    }

    /// Fetch a task by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the query fails.
    pub async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Task>> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(db_err("tasks.find_by_id"))
    }

    /// Whether the given video has a task in any non-terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the query fails.
    pub async fn has_open_task(&self, video_id: Uuid) -> DomainResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT count(*) FROM tasks
             WHERE video_id = $1 AND state NOT IN ('complete', 'failed')
            ",
        )
        .bind(video_id)
        .fetch_one(self.pool)
        .await
        .map_err(db_err("tasks.has_open_task"))?;
        Ok(count > 0)
    }

    /// List pending tasks in FIFO creation order, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the query fails.
    pub async fn list_pending(&self, limit: i64) -> DomainResult<Vec<Task>> {
        sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE state = 'pending' ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(db_err("tasks.list_pending"))
    }

    /// Update a task's state and optional error message, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn update_state(
        &self,
        id: Uuid,
        state: TaskState,
        error_message: Option<&str>,
    ) -> DomainResult<()> {
        sqlx::query(
            "UPDATE tasks SET state = $1, error_message = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(state)
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(db_err("tasks.update_state"))?;
        Ok(())
    }

    /// Route a task to a new queue, resetting it to `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn route_to_queue(&self, id: Uuid, queue_name: &str) -> DomainResult<()> {
        sqlx::query(
            "UPDATE tasks SET queue_name = $1, state = 'pending', updated_at = $2 WHERE id = $3",
        )
        .bind(queue_name)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(db_err("tasks.route_to_queue"))?;
        Ok(())
    }

    /// Bind an upload credential to a task.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn assign_account(&self, id: Uuid, account_id: Uuid) -> DomainResult<()> {
        sqlx::query("UPDATE tasks SET account_id = $1, updated_at = $2 WHERE id = $3")
            .bind(account_id)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(db_err("tasks.assign_account"))?;
        Ok(())
    }

    /// Record a retry: reset to pending on the same queue, bump `retries`, and record the error.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn record_retry(&self, id: Uuid, error_message: &str) -> DomainResult<()> {
        sqlx::query(
            r"
            UPDATE tasks
               SET state = 'pending', retries = retries + 1, error_message = $1, updated_at = $2
             WHERE id = $3
            ",
        )
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(db_err("tasks.record_retry"))?;
        Ok(())
    }

    /// Persist the local path produced by the download stage.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn set_local_path(&self, id: Uuid, local_path: &str) -> DomainResult<()> {
        sqlx::query("UPDATE tasks SET local_path = $1, updated_at = $2 WHERE id = $3")
            .bind(local_path)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(db_err("tasks.set_local_path"))?;
        Ok(())
    }

    /// Persist the share URL produced by the upload stage.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn set_share_url(&self, id: Uuid, share_url: &str) -> DomainResult<()> {
        sqlx::query("UPDATE tasks SET share_url = $1, updated_at = $2 WHERE id = $3")
            .bind(share_url)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(db_err("tasks.set_share_url"))?;
        Ok(())
    }

    /// Mark any task stuck in a transient state past `max_age_seconds` as failed.
    /// Returns the number of rows touched.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the update fails.
    pub async fn fail_orphans(&self, max_age_seconds: i64) -> DomainResult<u64> {
        let result = sqlx::query(
            r"
            UPDATE tasks
               SET state = 'failed',
                   error_message = 'orphan cleanup: stuck in transient state',
                   updated_at = now()
             WHERE state IN ('downloading', 'remuxing', 'uploading', 'verifying')
               AND updated_at < now() - ($1 || ' seconds')::interval
            ",
        )
        .bind(max_age_seconds.to_string())
        .execute(self.pool)
        .await
        .map_err(db_err("tasks.fail_orphans"))?;
        Ok(result.rows_affected())
    }

    /// Count tasks currently in the given state.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the query fails.
    pub async fn count_by_state(&self, state: TaskState) -> DomainResult<i64> {
        sqlx::query_scalar("SELECT count(*) FROM tasks WHERE state = $1")
            .bind(state)
            .fetch_one(self.pool)
            .await
            .map_err(db_err("tasks.count_by_state"))
    }
}

/// CRUD operations over the `accounts` table.
///
/// LRU selection (`next_account`) lives in `pipeline-scheduler`, which needs a
/// transaction spanning a reactivation sweep and an atomic claim; this
/// repository only exposes the simple single-row operations the rest of the
/// pipeline needs.
pub struct AccountRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AccountRepository<'a> {
    pub(crate) const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new account row.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the insert fails.
    pub async fn insert(&self, account: &Account) -> DomainResult<Account> {
        sqlx::query_as::<_, Account>(
            r"
            INSERT INTO accounts (id, email, status, last_used_at, cooldown_until,
                                   lease_expires_at, daily_uploaded_bytes, daily_quota_bytes,
                                   quota_reset_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            ",
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(account.status)
        .bind(account.last_used_at)
        .bind(account.cooldown_until)
        .bind(account.lease_expires_at)
        .bind(account.daily_uploaded_bytes)
        .bind(account.daily_quota_bytes)
        .bind(account.quota_reset_at)
        .bind(account.created_at)
        .fetch_one(self.pool)
        .await
        .map_err(db_err("accounts.insert"))
    }

    /// Fetch an account by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the query fails.
    pub async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Account>> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(db_err("accounts.find_by_id"))
    }

    /// Count accounts currently `active`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if the query fails.
    pub async fn active_count(&self) -> DomainResult<i64> {
        sqlx::query_scalar("SELECT count(*) FROM accounts WHERE status = 'active'")
            .fetch_one(self.pool)
            .await
            .map_err(db_err("accounts.active_count"))
    }
}
