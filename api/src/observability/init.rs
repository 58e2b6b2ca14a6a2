//! Observability start-up
//!
//! Builds the tracer provider and the request counter from configuration.
//! Logging is installed separately and earlier, so failures here can be
//! reported.

use std::sync::Arc;

use tracing::info;

use super::Observability;
use super::lifecycle::TracerManager;
use super::metrics::{InMemoryRequestCounter, PrometheusRequestMetrics, RequestRecorder};
use super::tracing::build_resource;
use crate::config::AppConfig;

/// Everything the server needs from the telemetry stack
pub struct TelemetryRuntime {
    pub manager: Arc<TracerManager>,
    pub observability: Observability,
    /// Present when `/metrics` is enabled
    pub prometheus: Option<Arc<PrometheusRequestMetrics>>,
}

/// Set up tracing export and request metrics
///
/// Never fails: an unreachable collector leaves the tracer manager degraded
/// and the server starts anyway.
pub async fn init_observability(config: &AppConfig) -> TelemetryRuntime {
    let manager = Arc::new(TracerManager::from_config(&config.telemetry));
    let tracer = manager.initialize(build_resource(&config.telemetry, config.environment)).await;

    let prometheus = config.metrics.enabled.then(|| {
        Arc::new(PrometheusRequestMetrics::new(&[
            ("service", config.telemetry.service_name.as_str()),
            ("application", config.telemetry.application.as_str()),
        ]))
    });
    let recorder: Arc<dyn RequestRecorder> = match &prometheus {
        Some(metrics) => metrics.clone(),
        None => Arc::new(InMemoryRequestCounter::new()),
    };

    info!(
        environment = %config.environment.as_str(),
        tracing_enabled = config.telemetry.enabled,
        strategy = manager.strategy(),
        degraded = manager.is_degraded(),
        otlp_endpoint = %config.telemetry.otlp_endpoint,
        metrics_enabled = config.metrics.enabled,
        "Observability components initialized"
    );

    TelemetryRuntime {
        manager,
        observability: Observability::new(tracer, recorder),
        prometheus,
    }
}
