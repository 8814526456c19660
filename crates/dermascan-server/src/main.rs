//! DermaScan Server
//!
//! Skin-lesion image classification over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use dermascan_classifier::ModelStatus;
use dermascan_server::{create_router, telemetry, AppState, Cli, ServerConfig};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configuration first: it decides the log format
    let config = ServerConfig::load(&cli)?;
    telemetry::init_tracing(cli.verbose, config.logging.format);

    info!("Starting DermaScan server");
    info!(
        schema = %config.model.schema.display(),
        store = ?config.store.backend,
        top_k = config.model.top_k,
        "Configuration loaded"
    );

    let metrics_handle = telemetry::init_metrics()?;

    let state = AppState::new(config.clone(), Some(metrics_handle)).await?;

    if config.model.preload {
        match state.orchestrator.provider().preload().await {
            ModelStatus::Ready => info!("Classifier preloaded"),
            ModelStatus::Degraded(reason) => {
                warn!(reason = %reason, "Classifier unavailable; serving in degraded mode")
            }
            ModelStatus::Loading => {}
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.server.listen, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.listen, config.server.port
            )
        })?;

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, stopping server...");
}
