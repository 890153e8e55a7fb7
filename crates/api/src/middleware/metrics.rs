//! Prometheus metrics middleware and exporter.
//!
//! HTTP metrics are recorded here; business counters (`codes_claimed_total`,
//! `codes_pool_empty_total`, `codes_replaced_total`, `codes_contributed_total`)
//! are emitted by the domain services and database query timings by the
//! persistence crate. All of them render through the same recorder.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Middleware to record HTTP request metrics.
///
/// Records the following metrics:
/// - `http_requests_total`: Counter with labels (method, path, status)
/// - `http_request_duration_seconds`: Histogram with labels (method, path)
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = method_to_str(req.method());
    // Matched route template keeps code IDs out of label values
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(
        "http_requests_total",
        "method" => method,
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(duration);

    response
}

/// Convert HTTP method to string for metric labels.
fn method_to_str(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PATCH => "PATCH",
        Method::DELETE => "DELETE",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        _ => "OTHER",
    }
}

/// Handler for /metrics endpoint that returns Prometheus text format.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized",
        )
            .into_response(),
    }
}

/// Install the global Prometheus recorder.
///
/// Must be called once during startup, before any metrics are recorded.
/// Calling it again is a no-op.
pub fn init_metrics() -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0])?
        .install_recorder()?;
    // A concurrent initializer may have won; its handle serves the same data
    let _ = PROMETHEUS_HANDLE.set(handle);

    describe_counter!("codes_claimed_total", "Invite codes handed out");
    describe_counter!(
        "codes_pool_empty_total",
        "Claims that found no claimable code"
    );
    describe_counter!(
        "codes_replaced_total",
        "Replacement codes issued after a not-working report"
    );
    describe_counter!("codes_contributed_total", "Codes contributed by users");
    describe_counter!(
        "rate_limited_requests_total",
        "Requests rejected by the rate limiter"
    );
    describe_histogram!(persistence::metrics::QUERY_SECONDS, "Store query latency");
    describe_gauge!(
        persistence::metrics::POOL_CONNECTIONS,
        "Database pool connections by state"
    );
    describe_counter!(
        persistence::metrics::FAILURES_TOTAL,
        "Store operations that failed and rolled back"
    );
    Ok(())
}
