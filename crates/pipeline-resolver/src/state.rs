//! Resolver application state shared across every request.

use std::sync::Arc;
use std::time::Duration;

use pipeline_domain::Store;
use pipeline_stages::CdnResolver;
use pipeline_telemetry::Metrics;
use tokio::sync::Semaphore;

use crate::cache::CdnCache;
use crate::rate_limit::RateLimiter;

/// Shared dependencies behind every resolver handler.
pub(crate) struct ResolverState {
    pub(crate) store: Store,
    pub(crate) metrics: Metrics,
    pub(crate) cache: CdnCache,
    pub(crate) resolver: Box<dyn CdnResolver>,
    pub(crate) resolve_permits: Semaphore,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) local_share_scheme: String,
    pub(crate) local_media_root: Option<std::path::PathBuf>,
}

impl ResolverState {
    pub(crate) fn new(
        store: Store,
        metrics: Metrics,
        resolver: Box<dyn CdnResolver>,
        cache_ttl: Duration,
        concurrency: usize,
        rate_limit_rpm: u32,
        local_share_scheme: String,
        local_media_root: Option<std::path::PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            metrics,
            cache: CdnCache::new(cache_ttl),
            resolver,
            resolve_permits: Semaphore::new(concurrency.max(1)),
            rate_limiter: RateLimiter::new(rate_limit_rpm),
            local_share_scheme,
            local_media_root,
        })
    }
}
