//! Prometheus scrape endpoint

use std::sync::Arc;

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::metrics::PrometheusRequestMetrics;

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render the request counters, or 503 when metrics are disabled
pub async fn metrics_endpoint(
    State(metrics): State<Option<Arc<PrometheusRequestMetrics>>>,
) -> Response {
    let Some(metrics) = metrics else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Metrics not available").into_response();
    };

    let body = metrics.render();
    tracing::debug!(metrics_size = body.len(), "Metrics served");

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        body,
    )
        .into_response()
}
