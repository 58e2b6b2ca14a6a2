use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::debug;

use super::{ReadinessResponse, ReadinessStatus};
use crate::observability::{LifecycleState, TracerManager};

/// Liveness probe handler at /health
///
/// Returns 200 as long as the process can answer at all. Kept free of any
/// dependency so a stuck collector never gets the pod restarted.
pub async fn liveness_handler() -> &'static str {
    "OK"
}

/// Readiness probe handler at /health/ready
///
/// A degraded tracer still reports ready: pages are served the same, only
/// span export is missing. Anything other than `Ready` is 503.
pub async fn readiness_handler(State(manager): State<Arc<TracerManager>>) -> Response {
    debug!("Readiness check requested");

    let tracer = manager.state();
    let status = match tracer {
        LifecycleState::Ready if manager.is_degraded() => ReadinessStatus::Degraded,
        LifecycleState::Ready => ReadinessStatus::Ready,
        _ => ReadinessStatus::NotReady,
    };

    let body = Json(ReadinessResponse {
        status,
        tracer,
        tracer_strategy: manager.strategy(),
        version: env!("CARGO_PKG_VERSION"),
    });

    match status {
        ReadinessStatus::Ready | ReadinessStatus::Degraded => (StatusCode::OK, body).into_response(),
        ReadinessStatus::NotReady => (StatusCode::SERVICE_UNAVAILABLE, body).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::lifecycle::DisabledLifecycle;
    use opentelemetry_sdk::Resource;
    use std::time::Duration;

    fn manager() -> Arc<TracerManager> {
        Arc::new(TracerManager::new(
            Box::new(DisabledLifecycle),
            Duration::from_secs(1),
        ))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_liveness_handler() {
        assert_eq!(liveness_handler().await, "OK");
    }

    #[tokio::test]
    async fn test_readiness_before_tracer_init() {
        let response = readiness_handler(State(manager())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = json_body(response).await;
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["tracer"], "uninitialized");
    }

    #[tokio::test]
    async fn test_readiness_once_tracer_ready() {
        let manager = manager();
        manager.initialize(Resource::empty()).await;

        let response = readiness_handler(State(manager.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["tracer_strategy"], "disabled");

        manager.shutdown().await.unwrap();
        let response = readiness_handler(State(manager)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["tracer"], "closed");
    }
}
