//! Tracer provider lifecycle
//!
//! `Uninitialized -> Initializing -> Ready -> ShuttingDown -> Closed`
//!
//! A [`TracerLifecycle`] strategy assembles exporter, resource, batch span
//! processor and provider. [`TracerManager`] drives the state machine around
//! whichever strategy the factory picked:
//!
//! - a failing strategy leaves the manager `Ready` but degraded, with a
//!   provider that creates spans and never exports them
//! - shutdown flushes and closes the provider once, within a fixed deadline;
//!   every later call returns `Ok(())` immediately

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry_otlp::{SpanExporterBuilder, WithExportConfig};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, Tracer, TracerProvider};
use opentelemetry_sdk::Resource;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{error, info, warn};

use super::tracing::{resolve_endpoint, trace_config, CollectorEndpoint, TRACER_NAME};
use crate::config::{TelemetryConfig, TracerStrategy};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid collector endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to connect to collector at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("connecting to collector at {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    #[error("failed to build span exporter: {0}")]
    Exporter(#[from] TraceError),

    #[error("tracer provider shutdown failed: {0}")]
    Shutdown(String),

    #[error("tracer provider shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Where the manager is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    ShuttingDown = 3,
    Closed = 4,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Uninitialized,
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Ready,
            3 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Closed,
        }
    }
}

/// One way of assembling the exporter -> processor -> provider chain
#[async_trait]
pub trait TracerLifecycle: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn build_provider(&self, resource: Resource) -> Result<TracerProvider, TelemetryError>;
}

/// Exporter built straight from the endpoint; the gRPC channel connects lazily
#[derive(Debug, Clone)]
pub struct DirectLifecycle {
    endpoint: String,
    insecure: bool,
    export_timeout: Duration,
}

impl DirectLifecycle {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            endpoint: config.otlp_endpoint.clone(),
            insecure: config.insecure,
            export_timeout: Duration::from_secs(config.export_timeout_secs),
        }
    }
}

#[async_trait]
impl TracerLifecycle for DirectLifecycle {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn build_provider(&self, resource: Resource) -> Result<TracerProvider, TelemetryError> {
        let endpoint = resolve_endpoint(&self.endpoint, self.insecure)?;

        let mut exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint.uri.clone())
            .with_timeout(self.export_timeout);
        if endpoint.tls {
            exporter = exporter.with_tls_config(ClientTlsConfig::new());
        }
        let exporter = SpanExporterBuilder::from(exporter).build_span_exporter()?;

        Ok(TracerProvider::builder()
            .with_config(trace_config(resource))
            .with_batch_exporter(exporter, runtime::Tokio)
            .build())
    }
}

/// Dials the collector first, then builds exporter, processor and provider
/// explicitly over the established channel
#[derive(Debug, Clone)]
pub struct DialedLifecycle {
    endpoint: String,
    insecure: bool,
    connect_timeout: Duration,
    export_timeout: Duration,
}

impl DialedLifecycle {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            endpoint: config.otlp_endpoint.clone(),
            insecure: config.insecure,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            export_timeout: Duration::from_secs(config.export_timeout_secs),
        }
    }

    async fn dial(&self, endpoint: &CollectorEndpoint) -> Result<Channel, TelemetryError> {
        let connect_error = |source| TelemetryError::Connect {
            endpoint: endpoint.uri.clone(),
            source,
        };

        let mut transport = Endpoint::from_shared(endpoint.uri.clone())
            .map_err(connect_error)?
            .connect_timeout(self.connect_timeout)
            .timeout(self.export_timeout);
        if endpoint.tls {
            transport = transport
                .tls_config(ClientTlsConfig::new())
                .map_err(connect_error)?;
        }

        // connect_timeout only covers the TCP handshake, not name resolution
        match tokio::time::timeout(self.connect_timeout, transport.connect()).await {
            Ok(channel) => channel.map_err(connect_error),
            Err(_) => Err(TelemetryError::ConnectTimeout {
                endpoint: endpoint.uri.clone(),
                timeout: self.connect_timeout,
            }),
        }
    }
}

#[async_trait]
impl TracerLifecycle for DialedLifecycle {
    fn name(&self) -> &'static str {
        "dialed"
    }

    async fn build_provider(&self, resource: Resource) -> Result<TracerProvider, TelemetryError> {
        let endpoint = resolve_endpoint(&self.endpoint, self.insecure)?;
        let channel = self.dial(&endpoint).await?;

        let exporter = SpanExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_channel(channel)
                .with_timeout(self.export_timeout),
        )
        .build_span_exporter()?;

        let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_max_export_timeout(self.export_timeout)
                    .build(),
            )
            .build();

        Ok(TracerProvider::builder()
            .with_config(trace_config(resource))
            .with_span_processor(processor)
            .build())
    }
}

/// Provider without processors: spans get ids but never leave the process
#[derive(Debug, Clone, Default)]
pub struct DisabledLifecycle;

#[async_trait]
impl TracerLifecycle for DisabledLifecycle {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn build_provider(&self, resource: Resource) -> Result<TracerProvider, TelemetryError> {
        Ok(local_provider(resource))
    }
}

fn local_provider(resource: Resource) -> TracerProvider {
    TracerProvider::builder()
        .with_config(trace_config(resource))
        .build()
}

/// Pick the construction strategy named by the configuration
pub fn select_lifecycle(config: &TelemetryConfig) -> Box<dyn TracerLifecycle> {
    if !config.enabled {
        return Box::new(DisabledLifecycle);
    }

    match config.strategy {
        TracerStrategy::Direct => Box::new(DirectLifecycle::new(config)),
        TracerStrategy::Dialed => Box::new(DialedLifecycle::new(config)),
    }
}

/// Owns the tracer provider from construction to shutdown
///
/// Tracers only hold a weak reference to their provider, so the provider
/// slot is the sole owner: taking it out and dropping it is what shuts the
/// span processors and the exporter down.
pub struct TracerManager {
    lifecycle: Box<dyn TracerLifecycle>,
    state: AtomicU8,
    degraded: AtomicBool,
    // held across the build so shutdown waits for an in-flight initialize
    provider: Mutex<Option<TracerProvider>>,
    shutdown_timeout: Duration,
}

impl TracerManager {
    pub fn new(lifecycle: Box<dyn TracerLifecycle>, shutdown_timeout: Duration) -> Self {
        Self {
            lifecycle,
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
            degraded: AtomicBool::new(false),
            provider: Mutex::new(None),
            shutdown_timeout,
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(
            select_lifecycle(config),
            Duration::from_secs(config.shutdown_timeout_secs),
        )
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True when the strategy failed and spans are kept in-process only
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn strategy(&self) -> &'static str {
        self.lifecycle.name()
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), LifecycleState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(LifecycleState::from_u8)
    }

    /// Build the provider and hand out a tracer
    ///
    /// Never fails: a strategy error is logged and replaced by an in-process
    /// provider so request handling is unaffected. Concurrent callers wait
    /// for the first build and share its provider. Once the manager is
    /// closed the returned tracer records nothing.
    pub async fn initialize(&self, resource: Resource) -> Tracer {
        let mut slot = self.provider.lock().await;
        if let Some(provider) = slot.as_ref() {
            warn!("Tracer provider already initialized");
            return provider.tracer(TRACER_NAME);
        }

        if let Err(current) = self.transition(LifecycleState::Uninitialized, LifecycleState::Initializing) {
            warn!(state = ?current, "Tracer manager is closed, spans will not be recorded");
            return closed_tracer();
        }

        let provider = match self.lifecycle.build_provider(resource.clone()).await {
            Ok(provider) => {
                info!(strategy = self.lifecycle.name(), "Tracer provider ready");
                provider
            }
            Err(e) => {
                error!(
                    strategy = self.lifecycle.name(),
                    error = %e,
                    "Could not set up trace exporter, spans will not be exported"
                );
                self.degraded.store(true, Ordering::Release);
                local_provider(resource)
            }
        };

        let tracer = provider.tracer(TRACER_NAME);
        *slot = Some(provider);
        let _ = self.transition(LifecycleState::Initializing, LifecycleState::Ready);
        tracer
    }

    /// Flush buffered spans and close the exporter
    ///
    /// Only the first call does any work. A call that races an in-flight
    /// initialize waits for it, then closes the provider it built. The flush
    /// and the final provider drop run on the blocking pool and are abandoned
    /// once the shutdown timeout elapses; the manager is `Closed` afterwards
    /// whatever the outcome.
    pub async fn shutdown(&self) -> Result<(), TelemetryError> {
        let mut slot = self.provider.lock().await;
        match self.transition(LifecycleState::Ready, LifecycleState::ShuttingDown) {
            Ok(()) => {}
            Err(LifecycleState::Uninitialized) => {
                let _ = self.transition(LifecycleState::Uninitialized, LifecycleState::Closed);
                return Ok(());
            }
            Err(_) => return Ok(()),
        }

        let Some(provider) = slot.take() else {
            self.state.store(LifecycleState::Closed as u8, Ordering::Release);
            return Ok(());
        };
        drop(slot);

        let close = tokio::task::spawn_blocking(move || {
            let flushed = provider
                .force_flush()
                .into_iter()
                .find_map(Result::err)
                .map_or(Ok(()), Err);
            // last strong reference: shuts the processors and exporter down
            drop(provider);
            flushed
        });

        let outcome = match tokio::time::timeout(self.shutdown_timeout, close).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(TelemetryError::Shutdown(e.to_string())),
            Ok(Err(join_error)) => Err(TelemetryError::Shutdown(join_error.to_string())),
            Err(_) => Err(TelemetryError::ShutdownTimeout(self.shutdown_timeout)),
        };

        self.state.store(LifecycleState::Closed as u8, Ordering::Release);
        if outcome.is_ok() {
            info!("Tracer provider shut down");
        }
        outcome
    }
}

/// A tracer whose provider is already gone, so its spans are non-recording
fn closed_tracer() -> Tracer {
    TracerProvider::builder().build().tracer(TRACER_NAME)
}
