//! Span plumbing shared by the lifecycle strategies and the dispatcher
//!
//! - Resource descriptor and sampler configuration
//! - Collector endpoint resolution
//! - W3C trace context extraction from request headers
//! - Trace id formatting for log correlation

use axum::http::{HeaderMap, Uri};
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Config, Sampler};
use opentelemetry_sdk::Resource;

use super::lifecycle::TelemetryError;
use crate::config::{Environment, TelemetryConfig};

/// Name of the tracer handed out by the lifecycle manager
pub const TRACER_NAME: &str = "wiki-api";

/// Static attributes attached to every span this process exports
pub fn build_resource(config: &TelemetryConfig, environment: Environment) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        KeyValue::new("application", config.application.clone()),
        KeyValue::new("environment", environment.as_str()),
        KeyValue::new("telemetry.sdk.name", "opentelemetry"),
        KeyValue::new("telemetry.sdk.language", "rust"),
    ])
}

/// Every span is sampled; volume is bounded by the batch processor instead
pub fn trace_config(resource: Resource) -> Config {
    Config::default()
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(resource)
}

/// A collector address with its scheme settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorEndpoint {
    pub uri: String,
    pub tls: bool,
}

/// Normalize a configured collector address
///
/// A bare `host:port` gets `http://` when `insecure` is set and `https://`
/// otherwise. An explicit scheme is kept as given; TLS is used iff the final
/// scheme is `https`.
pub fn resolve_endpoint(raw: &str, insecure: bool) -> Result<CollectorEndpoint, TelemetryError> {
    let invalid = |reason: String| TelemetryError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason,
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("endpoint is empty".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else if insecure {
        format!("http://{}", trimmed)
    } else {
        format!("https://{}", trimmed)
    };

    let uri: Uri = candidate
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| invalid(e.to_string()))?;

    let tls = match uri.scheme_str() {
        Some("http") => false,
        Some("https") => true,
        Some(other) => return Err(invalid(format!("unsupported scheme {}", other))),
        None => return Err(invalid("missing scheme".to_string())),
    };

    if uri.host().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(CollectorEndpoint { uri: candidate, tls })
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}

/// Parent context carried by the request's `traceparent` header
///
/// Returns an empty context when the request carries no valid remote span, so
/// the caller's span becomes the root of a new trace.
pub fn extract_remote_context(headers: &HeaderMap) -> Context {
    if headers.is_empty() {
        return Context::new();
    }

    let propagator = TraceContextPropagator::new();
    let context = propagator.extract(&HeaderExtractor(headers));

    if context.span().span_context().is_valid() {
        context
    } else {
        Context::new()
    }
}

/// Lowercase 32-digit hex form of a span's trace id
pub fn trace_id_hex(span_context: &SpanContext) -> String {
    format!("{:032x}", span_context.trace_id())
}

/// Lowercase 16-digit hex form of a span id
pub fn span_id_hex(span_context: &SpanContext) -> String {
    format!("{:016x}", span_context.span_id())
}
