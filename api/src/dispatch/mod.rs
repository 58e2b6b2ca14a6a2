//! Instrumented request dispatch
//!
//! Every page action is served by an [`InstrumentedHandler`] that owns one
//! business handler. A request whose path matches the handler's action gets:
//!
//! 1. a fresh server span `{action} page`, child of the caller's
//!    `traceparent` if there is one
//! 2. the business handler, run with that span in its context
//! 3. the span ended
//! 4. exactly one `request completed` log record
//! 5. one increment of `wiki_pages_total{handler=...}`
//!
//! Steps 3 to 5 also run when the request future is dropped before the
//! handler finishes.
//!
//! A request that does not match gets a 404 and none of the above.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{MethodRouter, on},
};
use opentelemetry::trace::{Span as _, SpanContext, SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use tracing::{debug, info};

use crate::error::AppError;
use crate::observability::{Observability, RequestRecorder};
use crate::observability::tracing::{extract_remote_context, span_id_hex, trace_id_hex};
use crate::routing::{Action, match_path};

/// Nginx's status for a client that hung up before the response was ready
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Business logic for one page action
///
/// `cx` carries the per-request span; implementations may add events or
/// attributes to it but must not end it.
#[async_trait]
pub trait PageHandler: Send + Sync + 'static {
    async fn handle(&self, cx: &Context, request: Request, title: &str) -> Response;
}

pub struct InstrumentedHandler<H> {
    action: Action,
    handler: H,
    observability: Observability,
    registration: SpanContext,
}

impl<H: PageHandler> InstrumentedHandler<H> {
    /// Wrap `handler` for `action`
    ///
    /// Emits a short `register_handler` span whose ids are stamped on every
    /// request span this handler produces.
    pub fn new(action: Action, handler: H, observability: Observability) -> Self {
        let tracer = observability.tracer();
        let mut span = tracer
            .span_builder("register_handler")
            .with_kind(SpanKind::Internal)
            .with_attributes(vec![
                KeyValue::new("parentAttributeKey1", "parentAttributeValue1"),
                KeyValue::new("wiki.action", action.as_str()),
            ])
            .start_with_context(tracer, &Context::new());
        let registration = span.span_context().clone();

        debug!(
            handler = %action,
            trace_id = %trace_id_hex(&registration),
            "In parent span"
        );
        span.end();

        Self {
            action,
            handler,
            observability,
            registration,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Span context of the registration span
    pub fn registration(&self) -> &SpanContext {
        &self.registration
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        let path = request.uri().path().to_string();
        let Some(matched) = match_path(&path).filter(|m| m.action == self.action) else {
            return AppError::RouteMismatch(path).into_response();
        };

        let parent = extract_remote_context(request.headers());
        let tracer = self.observability.tracer();
        let span = tracer
            .span_builder(format!("{} page", self.action))
            .with_kind(SpanKind::Server)
            .with_attributes(vec![
                KeyValue::new("wiki.action", self.action.as_str()),
                KeyValue::new("wiki.page.title", matched.resource_id.clone()),
                KeyValue::new("http.request.method", request.method().to_string()),
                KeyValue::new("url.path", path),
                KeyValue::new("wiki.registration.trace_id", trace_id_hex(&self.registration)),
                KeyValue::new("wiki.registration.span_id", span_id_hex(&self.registration)),
            ])
            .start_with_context(tracer, &parent);
        let trace_id = trace_id_hex(span.span_context());

        let mut completion = Completion {
            action: self.action,
            title: &matched.resource_id,
            trace_id,
            started: Instant::now(),
            cx: parent.with_span(span),
            recorder: self.observability.recorder().as_ref(),
            status: None,
        };

        let response = self
            .handler
            .handle(&completion.cx, request, &matched.resource_id)
            .await;
        completion.status = Some(response.status());
        drop(completion);

        response
    }
}

/// Ends the request span, then logs and counts the request, exactly once
///
/// Runs from `Drop`, so a handler future dropped mid-flight (client gone)
/// is still recorded, with status 499 and `cancelled=true`.
struct Completion<'a> {
    action: Action,
    title: &'a str,
    trace_id: String,
    started: Instant,
    cx: Context,
    recorder: &'a dyn RequestRecorder,
    status: Option<StatusCode>,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let code = self.status.map_or(CLIENT_CLOSED_REQUEST, |status| status.as_u16());

        let span = self.cx.span();
        span.set_attribute(KeyValue::new("http.response.status_code", i64::from(code)));
        match self.status {
            None => span.set_status(Status::error("request cancelled")),
            Some(status) if status.is_server_error() => {
                span.set_status(Status::error(status.to_string()))
            }
            Some(_) => {}
        }
        span.end();

        info!(
            handler = %self.action,
            title = %self.title,
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            trace_id = %self.trace_id,
            status = code,
            cancelled = self.status.is_none(),
            "request completed"
        );

        self.recorder.record_request(self.action);
    }
}

/// Axum route for an instrumented handler, restricted to the action's methods
pub fn page_route<H: PageHandler>(handler: Arc<InstrumentedHandler<H>>) -> MethodRouter {
    on(handler.action().methods(), move |request: Request| {
        let handler = handler.clone();
        async move { handler.dispatch(request).await }
    })
}
