pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod observability;
pub mod pages;
pub mod profiling;
pub mod routing;
pub mod server;
pub mod storage;

pub use config::*;
pub use error::*;
pub use server::*;

use std::future::Future;
use std::panic;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::observability::TelemetryLayerHandle;
use crate::storage::FilePageStore;

/// Main server entry point for library usage
pub async fn run_server() -> Result<()> {
    let app_config = config::load_config()?;

    // Logging first so every later failure is reported through it
    let telemetry_layer = observability::init_logging(&app_config.logging)?;

    panic::set_hook(Box::new(|panic_info| {
        ::tracing::error!(?panic_info, "FATAL: Panic occurred");
        std::process::exit(1);
    }));

    ::tracing::info!("Wiki server starting up");

    let listener = server::bind(&app_config.server).await?;
    run_with_config(
        app_config,
        Some(telemetry_layer),
        listener,
        server::shutdown_signal(),
    )
    .await
}

/// Run the server on `listener` until `shutdown` resolves
///
/// Telemetry set-up failures never stop the server. On the way out the
/// tracer provider is flushed and closed; errors there are logged only.
pub async fn run_with_config<F>(
    app_config: AppConfig,
    telemetry_layer: Option<TelemetryLayerHandle>,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let _profiling = profiling::start_profiling(&app_config.profiling);

    let telemetry = observability::init_observability(&app_config).await;
    if let Some(layer) = &telemetry_layer {
        if app_config.telemetry.enabled {
            if let Err(e) = layer.attach_tracer(telemetry.observability.tracer().clone()) {
                ::tracing::warn!(error = %e, "Spans from tracing instrumentation will not be exported");
            }
        }
    }

    let services = AppServices {
        store: Arc::new(FilePageStore::new(&app_config.storage.data_dir)),
        observability: telemetry.observability.clone(),
        tracer_manager: telemetry.manager.clone(),
        prometheus: telemetry.prometheus.clone(),
    };
    let router = server::create_router(&services);

    let drain_timeout = Duration::from_secs(app_config.server.shutdown_timeout);
    let served = server::serve(listener, router, shutdown, drain_timeout).await;
    if let Err(e) = &served {
        ::tracing::error!(error = %e, "HTTP server failed");
    }

    if let Some(layer) = &telemetry_layer {
        layer.detach_tracer();
    }
    if let Err(e) = telemetry.manager.shutdown().await {
        ::tracing::error!(error = %e, "Tracer provider shutdown failed");
    }

    ::tracing::info!("Server shutdown complete");
    served
}
