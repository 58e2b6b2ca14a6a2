//! Test doubles for the span pipeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::trace::{Tracer, TracerProvider};

use super::tracing::TRACER_NAME;

/// Exporter that keeps every finished span in memory
#[derive(Debug, Clone, Default)]
pub struct CollectingExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    shutdowns: Arc<AtomicUsize>,
    shutdown_delay: Option<Duration>,
}

impl CollectingExporter {
    /// An exporter whose shutdown blocks for `delay`
    pub fn with_shutdown_delay(delay: Duration) -> Self {
        Self {
            shutdown_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.lock().unwrap().clone()
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl SpanExporter for CollectingExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.spans.lock().unwrap().extend(batch);
        Box::pin(std::future::ready(Ok(())))
    }

    fn shutdown(&mut self) {
        if let Some(delay) = self.shutdown_delay {
            std::thread::sleep(delay);
        }
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Provider exporting synchronously into a [`CollectingExporter`]
pub fn collecting_tracer() -> (TracerProvider, Tracer, CollectingExporter) {
    let exporter = CollectingExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let tracer = provider.tracer(TRACER_NAME);
    (provider, tracer, exporter)
}
