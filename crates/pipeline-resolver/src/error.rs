//! RFC9457-style API error wrapper.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Structured problem-details body returned on every non-2xx response.
#[derive(Debug, Serialize)]
pub(crate) struct ProblemDetails {
    pub(crate) title: &'static str,
    pub(crate) status: u16,
    pub(crate) detail: Option<String>,
}

/// Error surfaced by a resolver handler, carrying the HTTP status it maps to.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    title: &'static str,
    detail: Option<String>,
}

impl ApiError {
    const fn new(status: StatusCode, title: &'static str) -> Self {
        Self {
            status,
            title,
            detail: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// The supplied video id was not a valid UUID.
    pub(crate) fn invalid_id(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid video id").with_detail(detail)
    }

    /// No video row exists for the requested id.
    pub(crate) fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "video not found").with_detail(detail)
    }

    /// The video exists but has not been uploaded yet.
    pub(crate) fn not_uploaded(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "video not yet uploaded").with_detail(detail)
    }

    /// The caller exceeded the resolver's request budget.
    pub(crate) fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
            .with_detail(format!("retry after {retry_after_secs}s"))
    }

    /// The external resolver's landing page did not contain a parseable CDN URL.
    pub(crate) fn bad_gateway(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "upstream parse failure").with_detail(detail)
    }

    /// A required dependency (store, local file, external resolver) is unavailable.
    pub(crate) fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "dependency unavailable").with_detail(detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            title: self.title,
            status: self.status.as_u16(),
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}
