//! Environment-derived construction of the resolver's [`ApiServer`].

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use pipeline_config::Settings;
use pipeline_domain::Store;
use pipeline_telemetry::Metrics;

use crate::resolver::HttpCdnResolver;
use crate::router::ApiServer;
use crate::state::ResolverState;

/// Build the resolver's [`ApiServer`] and bind address from process settings
/// and already-constructed shared dependencies.
///
/// # Errors
///
/// Returns an error if the configured bind address cannot be parsed.
pub fn build_server(settings: &Settings, store: Store, metrics: Metrics) -> Result<(ApiServer, SocketAddr)> {
    let client = reqwest::Client::builder()
        .build()
        .context("failed to build the resolver's HTTP client")?;
    let resolver = Box::new(HttpCdnResolver::new(client));

    let local_media_root = (settings.pixel_injector_mode == pipeline_config::PixelInjectorMode::Local)
        .then(|| std::path::PathBuf::from("."));

    let state = ResolverState::new(
        store,
        metrics,
        resolver,
        Duration::from_secs(settings.resolver_cache_ttl_seconds),
        settings.resolver_concurrency,
        settings.resolver_rate_limit_rpm,
        settings.pixel_injector_local_share_scheme.clone(),
        local_media_root,
    );

    let addr: SocketAddr = settings
        .resolver_bind_addr
        .parse()
        .with_context(|| format!("invalid resolver bind address {}", settings.resolver_bind_addr))?;

    Ok((ApiServer::new(state), addr))
}
