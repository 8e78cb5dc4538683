//! Router construction and server host for the resolver.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{Router, extract::Request, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::handlers::{health, local_video, metrics, resolve_video, stream_video};
use crate::state::ResolverState;

/// Axum router wrapper hosting the resolver's HTTP surface.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    pub(crate) fn new(state: Arc<ResolverState>) -> Self {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty,
                )
            })
            .on_response(|response: &axum::response::Response, latency: Duration, span: &Span| {
                span.record("status_code", response.status().as_u16());
                let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                span.record("latency_ms", latency_ms);
            });

        let router = Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route("/resolve/{video_id}", get(resolve_video))
            .route("/stream/{video_id}", get(stream_video))
            .route("/local/{video_id}", get(local_video))
            .layer(trace_layer)
            .with_state(state);

        Self { router }
    }

    /// Serve the resolver on `addr` until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server
    /// terminates unexpectedly.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        tracing::info!("starting resolver on {addr}");
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router.into_make_service()).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) const fn router(&self) -> &Router {
        &self.router
    }
}
