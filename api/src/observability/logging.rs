//! Structured logging
//!
//! The subscriber is installed before the tracer provider exists, so the
//! OpenTelemetry bridge sits behind a reload slot that starts empty and is
//! filled once the lifecycle manager hands out a tracer.

use anyhow::{Result, anyhow};
use opentelemetry_sdk::trace::Tracer;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

use crate::config::LoggingConfig;

type TelemetryLayer = OpenTelemetryLayer<Registry, Tracer>;

/// Slot for the `tracing` -> OpenTelemetry bridge layer
#[derive(Clone)]
pub struct TelemetryLayerHandle {
    handle: reload::Handle<Option<TelemetryLayer>, Registry>,
}

impl TelemetryLayerHandle {
    /// Export `tracing` spans through `tracer` from now on
    pub fn attach_tracer(&self, tracer: Tracer) -> Result<()> {
        self.handle
            .reload(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
            .map_err(|e| anyhow!("Failed to attach tracer to subscriber: {}", e))
    }

    /// Stop bridging, used before the provider is shut down
    pub fn detach_tracer(&self) {
        if let Err(e) = self.handle.reload(None) {
            tracing::warn!(error = %e, "Failed to detach tracer from subscriber");
        }
    }
}

/// Install the global subscriber
///
/// Supports two formats:
/// - "json": one object per line with the current span, for production
/// - "pretty": human-readable output for development
///
/// `RUST_LOG` wins over `logging.level` when set. A second call fails
/// instead of replacing the installed subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<TelemetryLayerHandle> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (json_layer, pretty_layer) = match config.format.as_str() {
        "json" => (
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            ),
            None,
        ),
        "pretty" => (None, Some(fmt::layer().pretty().with_target(true))),
        other => {
            return Err(anyhow!(
                "Unsupported log format: {}. Use 'json' or 'pretty'",
                other
            ));
        }
    };

    let (telemetry_layer, handle) = reload::Layer::new(None::<TelemetryLayer>);

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()?;

    // SDK-internal errors (failed exports and the like) go to the log too
    if let Err(e) = opentelemetry::global::set_error_handler(|e| {
        tracing::warn!(error = %e, "OpenTelemetry error");
    }) {
        tracing::warn!(error = %e, "Failed to install OpenTelemetry error handler");
    }

    Ok(TelemetryLayerHandle { handle })
}
