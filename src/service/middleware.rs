//! Service middleware for request metrics and access logging.
//!
//! Every request carries a correlation id: the caller's `X-Request-Id` when
//! present, a fresh UUID otherwise. It is attached to the request span and
//! echoed on the response.
//!
//! ## Metrics Exposed
//!
//! - `request` - request count and latency by path, method, status
//! - `augment` - requested/added variable counts per augmentation
//! - `catalog_reload` - reload outcomes and dataset counts
//!
//! Metrics are structured `tracing` events under the
//! `variable_kernel::metrics` target and are aggregated from logs.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use regex_lite::Regex;
use tracing::{info, info_span, Instrument};

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id for a request: the caller's `X-Request-Id` if it is
/// non-empty visible ASCII, otherwise a new UUID.
fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Access logging middleware.
///
/// Runs the request inside a `request` span tagged with its correlation id,
/// logs one access event on completion and echoes the id as `X-Request-Id`.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let trace_id = correlation_id(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let mut response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as u64;
    span.record("status", status);
    span.record("latency_ms", latency_ms);

    info!(
        target: "variable_kernel::access",
        trace_id = %trace_id,
        method = %method,
        path = %path,
        status = status,
        latency_ms = latency_ms,
        "request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Metrics middleware that records request counts and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    info!(
        target: "variable_kernel::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request_metric"
    );

    response
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Dataset identifiers in catalog paths become `:dataset_id`.
fn normalize_path(path: &str) -> String {
    static DATASET_SEGMENT: OnceLock<Regex> = OnceLock::new();
    let re = DATASET_SEGMENT.get_or_init(|| {
        Regex::new(r"^/api/catalogs/([^/]+)$").expect("dataset path regex is valid")
    });

    match re.captures(path) {
        Some(caps) if &caps[1] != "reload" => "/api/catalogs/:dataset_id".to_string(),
        _ => path.to_string(),
    }
}

/// Record augmentation metrics.
pub fn record_augment_metrics(requested: usize, added: usize, datasets: usize, latency_ms: u64) {
    info!(
        target: "variable_kernel::metrics",
        metric_type = "augment",
        requested = requested,
        added = added,
        datasets = datasets,
        latency_ms = latency_ms,
        "augment_metric"
    );
}

/// Record a catalog reload attempt.
pub fn record_catalog_reload(success: bool, dataset_count: usize) {
    let status = if success { "success" } else { "error" };
    info!(
        target: "variable_kernel::metrics",
        metric_type = "catalog_reload",
        status = status,
        dataset_count = dataset_count,
        "catalog_reload_metric"
    );
}
