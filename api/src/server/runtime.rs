use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{Router, http::Uri, routing::get};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::{InstrumentedHandler, page_route};
use crate::error::AppError;
use crate::health::handlers::{liveness_handler, readiness_handler};
use crate::observability::{Observability, PrometheusRequestMetrics, TracerManager, metrics_endpoint};
use crate::pages::{EditHandler, SaveHandler, ViewHandler};
use crate::routing::Action;
use crate::storage::PageStore;

/// Shared services the router is built from
#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn PageStore>,
    pub observability: Observability,
    pub tracer_manager: Arc<TracerManager>,
    /// `None` when `/metrics` is disabled
    pub prometheus: Option<Arc<PrometheusRequestMetrics>>,
}

/// Create the Axum router
///
/// - `/view/{title}`, `/edit/{title}`, `/save/{title}` through the
///   instrumented dispatcher
/// - `/metrics` Prometheus exposition
/// - `/health` liveness, `/health/ready` readiness
///
/// Each page handler is registered exactly once here.
pub fn create_router(services: &AppServices) -> Router {
    let observability = &services.observability;

    let view = InstrumentedHandler::new(
        Action::View,
        ViewHandler::new(services.store.clone()),
        observability.clone(),
    );
    let edit = InstrumentedHandler::new(
        Action::Edit,
        EditHandler::new(services.store.clone()),
        observability.clone(),
    );
    let save = InstrumentedHandler::new(
        Action::Save,
        SaveHandler::new(services.store.clone()),
        observability.clone(),
    );

    let health = Router::new()
        .route("/health", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(services.tracer_manager.clone());

    let metrics = Router::new()
        .route("/metrics", get(metrics_endpoint))
        .with_state(services.prometheus.clone());

    Router::new()
        .route(Action::View.route_pattern(), page_route(Arc::new(view)))
        .route(Action::Edit.route_pattern(), page_route(Arc::new(edit)))
        .route(Action::Save.route_pattern(), page_route(Arc::new(save)))
        .merge(health)
        .merge(metrics)
        .fallback(not_found)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::RouteMismatch(uri.path().to_string())
}

/// Bind the configured listen address
pub async fn bind(config: &ServerConfig) -> Result<TcpListener> {
    let bind_addr = format!("{}:{}", config.bind, config.port);

    let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {}: {}. Is another process using this port?",
            bind_addr,
            e
        )
    })?;
    info!("Server bound to {}", listener.local_addr()?);

    Ok(listener)
}

/// Serve `router` until `shutdown` resolves, then drain in-flight requests
///
/// The drain is bounded by `drain_timeout`; connections still open after it
/// are abandoned so the caller can move on to closing telemetry.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F, drain_timeout: Duration) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting HTTP server...");

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let _ = signalled_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result?;
            info!("HTTP server stopped accepting connections");
            return Ok(());
        }
        Ok(()) = signalled_rx => {}
    }

    match tokio::time::timeout(drain_timeout, &mut server).await {
        Ok(result) => {
            result?;
            info!("HTTP server stopped accepting connections");
        }
        Err(_) => {
            warn!(
                timeout_secs = drain_timeout.as_secs_f64(),
                "Graceful drain timed out, abandoning open connections"
            );
        }
    }
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stalled() -> &'static str {
        tokio::time::sleep(Duration::from_secs(30)).await;
        "late"
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_is_bounded_by_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route("/stall", get(stalled));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(
            listener,
            router,
            async move {
                let _ = stop_rx.await;
            },
            Duration::from_millis(200),
        ));

        let request = tokio::spawn(reqwest::get(format!("http://{}/stall", addr)));
        tokio::time::sleep(Duration::from_millis(100)).await;

        stop_tx.send(()).unwrap();
        let served = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("serve did not return after the drain timeout")
            .unwrap();
        assert!(served.is_ok());
        request.abort();
    }

    #[tokio::test]
    async fn test_serve_returns_after_idle_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let router = Router::new().route("/health", get(liveness_handler));

        let served = serve(listener, router, async {}, Duration::from_secs(1)).await;
        assert!(served.is_ok());
    }
}
