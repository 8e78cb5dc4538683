//! Request handlers for the resolver's HTTP surface.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::ResolverState;

/// Source the returned CDN URL was satisfied from.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum ResolutionSource {
    Cache,
    Database,
    Local,
    Resolved,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResolveResponse {
    video_id: Uuid,
    cdn_url: String,
    source: ResolutionSource,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

fn parse_video_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|err| ApiError::invalid_id(err.to_string()))
}

fn enforce_rate_limit(state: &ResolverState) -> Result<(), ApiError> {
    state
        .rate_limiter
        .try_acquire()
        .map_err(ApiError::rate_limited)
}

async fn resolve(state: &ResolverState, video_id: Uuid) -> Result<(String, ResolutionSource), ApiError> {
    if let Some(cdn_url) = state.cache.get(video_id) {
        state.metrics.inc_resolver_cache_hit();
        return Ok((cdn_url, ResolutionSource::Cache));
    }
    state.metrics.inc_resolver_cache_miss();

    let video = state
        .store
        .videos()
        .find_by_id(video_id)
        .await
        .map_err(|err| ApiError::service_unavailable(err.to_string()))?
        .ok_or_else(|| ApiError::not_found(format!("no video with id {video_id}")))?;

    if let Some(cdn_url) = video.cdn_url {
        state.cache.insert(video_id, cdn_url.clone());
        return Ok((cdn_url, ResolutionSource::Database));
    }

    let share_url = video
        .share_url
        .ok_or_else(|| ApiError::not_uploaded(format!("video {video_id} has no share URL yet")))?;

    let local_prefix = format!("{}://", state.local_share_scheme);
    if let Some(local_path) = share_url.strip_prefix(&local_prefix) {
        let cdn_url = format!("/local/{video_id}?path={local_path}");
        state.cache.insert(video_id, cdn_url.clone());
        return Ok((cdn_url, ResolutionSource::Local));
    }

    let _permit = state
        .resolve_permits
        .acquire()
        .await
        .map_err(|err| ApiError::service_unavailable(err.to_string()))?;
    let cdn_url = state
        .resolver
        .resolve(&share_url)
        .await
        .map_err(|err| ApiError::bad_gateway(err.to_string()))?;

    state
        .store
        .videos()
        .set_cdn_url(video_id, &cdn_url)
        .await
        .map_err(|err| ApiError::service_unavailable(err.to_string()))?;
    state.cache.insert(video_id, cdn_url.clone());

    Ok((cdn_url, ResolutionSource::Resolved))
}

/// `GET /health`
pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// `GET /metrics`
pub(crate) async fn metrics(State(state): State<Arc<ResolverState>>) -> Result<Response, ApiError> {
    let rendered = state
        .metrics
        .render()
        .map_err(|err| ApiError::service_unavailable(err.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        rendered,
    )
        .into_response())
}

/// `GET /resolve/{video_id}`
pub(crate) async fn resolve_video(
    State(state): State<Arc<ResolverState>>,
    Path(video_id): Path<String>,
) -> Result<Json<ResolveResponse>, ApiError> {
    enforce_rate_limit(&state)?;
    let video_id = parse_video_id(&video_id)?;
    let (cdn_url, source) = resolve(&state, video_id).await?;
    Ok(Json(ResolveResponse {
        video_id,
        cdn_url,
        source,
    }))
}

/// `GET /stream/{video_id}` — redirects to the resolved CDN URL.
pub(crate) async fn stream_video(
    State(state): State<Arc<ResolverState>>,
    Path(video_id): Path<String>,
) -> Result<Response, ApiError> {
    enforce_rate_limit(&state)?;
    let video_id = parse_video_id(&video_id)?;
    let (cdn_url, _source) = resolve(&state, video_id).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, cdn_url)]).into_response())
}

/// `GET /local/{video_id}` — streams a locally-served file (local mode only).
pub(crate) async fn local_video(
    State(state): State<Arc<ResolverState>>,
    Path(video_id): Path<String>,
) -> Result<Response, ApiError> {
    let video_id = parse_video_id(&video_id)?;
    let root = state
        .local_media_root
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("local media serving is not configured"))?;

    let video = state
        .store
        .videos()
        .find_by_id(video_id)
        .await
        .map_err(|err| ApiError::service_unavailable(err.to_string()))?
        .ok_or_else(|| ApiError::not_found(format!("no video with id {video_id}")))?;
    let local_path = video
        .local_path
        .ok_or_else(|| ApiError::not_uploaded(format!("video {video_id} has no local file")))?;

    let path = root.join(local_path.trim_start_matches('/'));
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|err| ApiError::not_found(err.to_string()))?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "video/mp4")], body).into_response())
}
