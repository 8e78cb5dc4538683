//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters/gauges the orchestrator, upload worker, and
//!   resolver need for operational visibility.

use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    rate_limit_throttled_total: IntCounter,
    queue_depth: IntGaugeVec,
    orchestrator_ticks_total: IntCounter,
    orchestrator_gc_total: IntCounter,
    orchestrator_dispatched_total: IntCounter,
    account_lease_contention_total: IntCounter,
    upload_retries_total: IntCounter,
    upload_dlq_pushes_total: IntCounter,
    resolver_cache_hits_total: IntCounter,
    resolver_cache_misses_total: IntCounter,
}

/// Snapshot of selected counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Orchestrator ticks completed since process start.
    pub orchestrator_ticks_total: u64,
    /// Orphaned tasks reclaimed by GC since process start.
    pub orchestrator_gc_total: u64,
    /// Tasks dispatched onto a queue since process start.
    pub orchestrator_dispatched_total: u64,
    /// Times `next_account` found no eligible account.
    pub account_lease_contention_total: u64,
    /// Upload attempts retried after a transient failure.
    pub upload_retries_total: u64,
    /// Upload payloads pushed to the dead-letter queue.
    pub upload_dlq_pushes_total: u64,
    /// Resolver requests served from the in-memory cache.
    pub resolver_cache_hits_total: u64,
    /// Resolver requests that required a database lookup or external resolve.
    pub resolver_cache_misses_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total resolver HTTP requests received"),
            &["route", "code"],
        )?;
        let rate_limit_throttled_total = IntCounter::with_opts(Opts::new(
            "resolver_rate_limit_throttled_total",
            "Resolver requests rejected due to rate limiting",
        ))?;
        let queue_depth = IntGaugeVec::new(
            Opts::new("queue_depth", "Current depth of a named queue"),
            &["queue"],
        )?;
        let orchestrator_ticks_total = IntCounter::with_opts(Opts::new(
            "orchestrator_ticks_total",
            "Orchestrator ticks completed",
        ))?;
        let orchestrator_gc_total = IntCounter::with_opts(Opts::new(
            "orchestrator_gc_total",
            "Orphaned tasks reclaimed by GC",
        ))?;
        let orchestrator_dispatched_total = IntCounter::with_opts(Opts::new(
            "orchestrator_dispatched_total",
            "Tasks dispatched onto a queue",
        ))?;
        let account_lease_contention_total = IntCounter::with_opts(Opts::new(
            "account_lease_contention_total",
            "Times the scheduler found no eligible upload account",
        ))?;
        let upload_retries_total = IntCounter::with_opts(Opts::new(
            "upload_retries_total",
            "Upload attempts retried after a transient failure",
        ))?;
        let upload_dlq_pushes_total = IntCounter::with_opts(Opts::new(
            "upload_dlq_pushes_total",
            "Upload payloads pushed to the dead-letter queue",
        ))?;
        let resolver_cache_hits_total = IntCounter::with_opts(Opts::new(
            "resolver_cache_hits_total",
            "Resolve requests served from the in-memory cache",
        ))?;
        let resolver_cache_misses_total = IntCounter::with_opts(Opts::new(
            "resolver_cache_misses_total",
            "Resolve requests that missed the in-memory cache",
        ))?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(rate_limit_throttled_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(orchestrator_ticks_total.clone()))?;
        registry.register(Box::new(orchestrator_gc_total.clone()))?;
        registry.register(Box::new(orchestrator_dispatched_total.clone()))?;
        registry.register(Box::new(account_lease_contention_total.clone()))?;
        registry.register(Box::new(upload_retries_total.clone()))?;
        registry.register(Box::new(upload_dlq_pushes_total.clone()))?;
        registry.register(Box::new(resolver_cache_hits_total.clone()))?;
        registry.register(Box::new(resolver_cache_misses_total.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                rate_limit_throttled_total,
                queue_depth,
                orchestrator_ticks_total,
                orchestrator_gc_total,
                orchestrator_dispatched_total,
                account_lease_contention_total,
                upload_retries_total,
                upload_dlq_pushes_total,
                resolver_cache_hits_total,
                resolver_cache_misses_total,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Increment the resolver rate-limit throttle counter.
    pub fn inc_rate_limit_throttled(&self) {
        self.inner.rate_limit_throttled_total.inc();
    }

    /// Set the depth gauge for a named queue.
    pub fn set_queue_depth(&self, queue: &str, depth: i64) {
        self.inner.queue_depth.with_label_values(&[queue]).set(depth);
    }

    /// Increment the orchestrator tick counter.
    pub fn inc_orchestrator_tick(&self) {
        self.inner.orchestrator_ticks_total.inc();
    }

    /// Add `count` orphaned tasks to the GC counter.
    pub fn add_orchestrator_gc(&self, count: u64) {
        self.inner.orchestrator_gc_total.inc_by(count);
    }

    /// Increment the dispatched-task counter.
    pub fn inc_orchestrator_dispatched(&self) {
        self.inner.orchestrator_dispatched_total.inc();
    }

    /// Increment the account lease contention counter.
    pub fn inc_account_lease_contention(&self) {
        self.inner.account_lease_contention_total.inc();
    }

    /// Increment the upload retry counter.
    pub fn inc_upload_retry(&self) {
        self.inner.upload_retries_total.inc();
    }

    /// Increment the upload DLQ push counter.
    pub fn inc_upload_dlq_push(&self) {
        self.inner.upload_dlq_pushes_total.inc();
    }

    /// Increment the resolver cache hit counter.
    pub fn inc_resolver_cache_hit(&self) {
        self.inner.resolver_cache_hits_total.inc();
    }

    /// Increment the resolver cache miss counter.
    pub fn inc_resolver_cache_miss(&self) {
        self.inner.resolver_cache_misses_total.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the most relevant counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            orchestrator_ticks_total: self.inner.orchestrator_ticks_total.get(),
            orchestrator_gc_total: self.inner.orchestrator_gc_total.get(),
            orchestrator_dispatched_total: self.inner.orchestrator_dispatched_total.get(),
            account_lease_contention_total: self.inner.account_lease_contention_total.get(),
            upload_retries_total: self.inner.upload_retries_total.get(),
            upload_dlq_pushes_total: self.inner.upload_dlq_pushes_total.get(),
            resolver_cache_hits_total: self.inner.resolver_cache_hits_total.get(),
            resolver_cache_misses_total: self.inner.resolver_cache_misses_total.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    #[allow(dead_code)]
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_ms_saturates_on_large_values() {
        let duration = Duration::from_secs(u64::MAX / 2);
        assert_eq!(Metrics::duration_to_ms(duration), i64::MAX);
    }

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/resolve/:video_id", 200);
        metrics.set_queue_depth("pipeline:upload", 3);
        metrics.inc_orchestrator_tick();
        metrics.add_orchestrator_gc(2);
        metrics.inc_orchestrator_dispatched();
        metrics.inc_account_lease_contention();
        metrics.inc_upload_retry();
        metrics.inc_upload_dlq_push();
        metrics.inc_resolver_cache_hit();
        metrics.inc_resolver_cache_miss();
        metrics.inc_rate_limit_throttled();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.orchestrator_ticks_total, 1);
        assert_eq!(snapshot.orchestrator_gc_total, 2);
        assert_eq!(snapshot.orchestrator_dispatched_total, 1);
        assert_eq!(snapshot.account_lease_contention_total, 1);
        assert_eq!(snapshot.upload_retries_total, 1);
        assert_eq!(snapshot.upload_dlq_pushes_total, 1);
        assert_eq!(snapshot.resolver_cache_hits_total, 1);
        assert_eq!(snapshot.resolver_cache_misses_total, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("orchestrator_ticks_total"));
        assert!(rendered.contains("queue_depth"));
        Ok(())
    }
}
