mod config;
mod error;
mod routes;
mod state;
mod ws;

use crate::config::AppConfig;
use crate::state::AppState;
use anyhow::Context;
use axum::http::HeaderValue;
use save_keeper::BackupStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .init();

    tracing::info!("Starting keeper server on port {}", config.port);

    // Open the store (recovers the index if needed)
    let keeper_config = config
        .keeper()
        .context("failed to load store configuration")?;
    let store = BackupStore::open(keeper_config)
        .await
        .context("failed to open backup store")?;
    tracing::info!("Store root: {}", store.root().display());

    // Build application state
    let state = Arc::new(AppState::new(store));

    // Build router
    let app = routes::create_router(state.clone())
        .layer(cors_layer(&config)?)
        .layer(TraceLayer::new_for_http());

    // Local-only: the store is on this machine's disk
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("WebSocket endpoint: ws://{}/ws", addr);

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn cors_layer(config: &AppConfig) -> anyhow::Result<CorsLayer> {
    let layer = match &config.cors_origin {
        Some(origin) if origin == "*" => CorsLayer::new().allow_origin(Any),
        Some(origin) => {
            let origin: HeaderValue = origin
                .parse()
                .with_context(|| format!("invalid CORS_ORIGIN: {}", origin))?;
            CorsLayer::new().allow_origin(origin)
        }
        None => return Ok(CorsLayer::new()),
    };
    Ok(layer.allow_methods(Any).allow_headers(Any))
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    tracing::info!("Shutting down...");
    cancel.cancel();
}
