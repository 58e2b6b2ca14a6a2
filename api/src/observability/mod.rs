//! Observability for the page handlers
//!
//! - Tracer provider lifecycle with pluggable construction strategies
//! - Per-action Prometheus request counter
//! - Structured logging with an OpenTelemetry bridge
//!
//! Nothing here is installed as process-global OpenTelemetry or `metrics`
//! state. The tracer and the counter travel together in [`Observability`]
//! and are handed to the dispatcher explicitly.

pub mod endpoint;
pub mod init;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod tracing;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use opentelemetry_sdk::trace::Tracer;

pub use endpoint::metrics_endpoint;
pub use init::{TelemetryRuntime, init_observability};
pub use lifecycle::{LifecycleState, TelemetryError, TracerLifecycle, TracerManager, select_lifecycle};
pub use logging::{TelemetryLayerHandle, init_logging};
pub use metrics::{InMemoryRequestCounter, PrometheusRequestMetrics, RequestRecorder};

/// Tracer and request counter shared by every instrumented handler
#[derive(Clone)]
pub struct Observability {
    tracer: Tracer,
    recorder: Arc<dyn RequestRecorder>,
}

impl Observability {
    pub fn new(tracer: Tracer, recorder: Arc<dyn RequestRecorder>) -> Self {
        Self { tracer, recorder }
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn recorder(&self) -> &Arc<dyn RequestRecorder> {
        &self.recorder
    }
}
