//! Periodic tick loop: garbage-collects orphans, dispatches pending tasks
//! onto their target queues subject to backpressure and account gating, and
//! sweeps expired videos.

use std::time::Duration;

use pipeline_domain::{Store, TaskState};
use pipeline_queue::{Broker, QueuePayload};
use pipeline_scheduler::{AccountScheduler, SchedulerError};
use tracing::{info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};

/// What to do with an upload-bound task when no account is currently eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoAccountPolicy {
    /// Leave the task pending; it will be retried on a later tick.
    Wait,
    /// Transition the task straight to `failed`.
    Fail,
}

/// Tunable knobs for [`Orchestrator::tick`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How often the caller should invoke [`Orchestrator::tick`].
    pub tick_interval: Duration,
    /// Maximum pending tasks dispatched per tick.
    pub batch_size: i64,
    /// Age past which a task stuck in a transient state is GC'd as an orphan.
    pub orphan_max_age_seconds: i64,
    /// Queue depth at which a warning is logged but dispatch still proceeds.
    pub warn_threshold: i64,
    /// Queue depth at which dispatch to that queue is skipped this tick.
    pub critical_threshold: i64,
    /// Behavior when no account is eligible for an upload-bound task.
    pub no_account_policy: NoAccountPolicy,
    /// Name of the download queue.
    pub download_queue_name: String,
    /// Name of the upload queue.
    pub upload_queue_name: String,
    /// Lease duration passed to `AccountScheduler::next_account`.
    pub account_lease_duration: Duration,
    /// Freshness window after which an `available` video is swept to `expired`.
    pub expired_video_max_age_seconds: i64,
}

/// Outcome of a single [`Orchestrator::tick`] invocation, surfaced for metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Orphaned tasks marked `failed` by the GC step.
    pub gc_count: u64,
    /// Tasks successfully dispatched onto a queue this tick.
    pub dispatched: usize,
    /// Tasks skipped this tick because their target queue was at or past `critical_threshold`.
    pub backpressured: usize,
    /// Upload-bound tasks left pending because no account was eligible.
    pub waiting_no_account: usize,
    /// Videos swept from `available` to `expired`.
    pub expired_count: u64,
}

/// Drives the periodic tick described in the module docs.
pub struct Orchestrator {
    store: Store,
    queue: Broker,
    scheduler: AccountScheduler,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Build an orchestrator over its collaborators.
    #[must_use]
    pub const fn new(store: Store, queue: Broker, scheduler: AccountScheduler, config: OrchestratorConfig) -> Self {
        Self {
            store,
            queue,
            scheduler,
            config,
        }
    }

    /// Run one tick: GC orphans, dispatch a batch of pending tasks, sweep expired videos.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] if a domain, queue, or scheduler operation fails
    /// for a reason other than the expected "no active accounts" condition.
    pub async fn tick(&self) -> OrchestratorResult<TickReport> {
        let gc_count = self
            .store
            .tasks()
            .fail_orphans(self.config.orphan_max_age_seconds)
            .await
            .map_err(|source| OrchestratorError::domain("tick.gc", source))?;
        if gc_count > 0 {
            warn!(gc_count, "reclaimed orphaned tasks stuck in a transient state");
        }

        let pending = self
            .store
            .tasks()
            .list_pending(self.config.batch_size)
            .await
            .map_err(|source| OrchestratorError::domain("tick.list_pending", source))?;

        let mut report = TickReport {
            gc_count,
            ..TickReport::default()
        };

        for task in pending {
            let target_queue = task.queue_name.clone();
            let next_state = if target_queue == self.config.download_queue_name {
                TaskState::Downloading
            } else if target_queue == self.config.upload_queue_name {
                TaskState::Uploading
            } else {
                warn!(task_id = %task.id, %target_queue, "task routed to an unrecognized queue, skipping");
                continue;
            };

            let depth = self
                .queue
                .length(&target_queue)
                .await
                .map_err(|source| OrchestratorError::queue("tick.queue_depth", source))?;
            if depth >= self.config.critical_threshold {
                report.backpressured += 1;
                continue;
            }
            if depth >= self.config.warn_threshold {
                warn!(%target_queue, depth, "queue depth past warn threshold, dispatching anyway");
            }

            let account_id = if next_state == TaskState::Uploading {
                match self.scheduler.next_account(self.config.account_lease_duration).await {
                    Ok(id) => Some(id),
                    Err(SchedulerError::NoActiveAccounts) => {
                        match self.config.no_account_policy {
                            NoAccountPolicy::Wait => {
                                report.waiting_no_account += 1;
                            }
                            NoAccountPolicy::Fail => {
                                self.store
                                    .tasks()
                                    .update_state(task.id, TaskState::Failed, Some("no eligible upload account"))
                                    .await
                                    .map_err(|source| OrchestratorError::domain("tick.fail_no_account", source))?;
                            }
                        }
                        continue;
                    }
                    Err(source) => {
                        return Err(OrchestratorError::Scheduler {
                            operation: "tick.next_account",
                            source,
                        });
                    }
                }
            } else {
                None
            };

            let mut payload = QueuePayload::new(
                task.id,
                task.video_id,
                target_queue.clone(),
                task.max_retries.max(0).cast_unsigned(),
            );
            payload.retries = task.retries.max(0).cast_unsigned();
            payload.account_id = account_id;
            payload.local_path.clone_from(&task.local_path);

            if let Some(account_id) = account_id {
                self.store
                    .tasks()
                    .assign_account(task.id, account_id)
                    .await
                    .map_err(|source| OrchestratorError::domain("tick.assign_account", source))?;
            }

            self.queue
                .push(&target_queue, &payload)
                .await
                .map_err(|source| OrchestratorError::queue("tick.dispatch", source))?;

            self.store
                .tasks()
                .update_state(task.id, next_state, None)
                .await
                .map_err(|source| OrchestratorError::domain("tick.transition", source))?;

            if let Some(account_id) = account_id {
                self.scheduler
                    .mark_used(account_id)
                    .await
                    .map_err(|source| OrchestratorError::Scheduler {
                        operation: "tick.mark_used",
                        source,
                    })?;
            }

            report.dispatched += 1;
        }

        report.expired_count = self
            .store
            .videos()
            .expire_stale(self.config.expired_video_max_age_seconds)
            .await
            .map_err(|source| OrchestratorError::domain("tick.expire_stale", source))?;

        info!(
            gc_count = report.gc_count,
            dispatched = report.dispatched,
            backpressured = report.backpressured,
            waiting_no_account = report.waiting_no_account,
            expired_count = report.expired_count,
            "orchestrator tick complete"
        );

        Ok(report)
    }
}
