//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services. It
//! provides the router construction and server startup functionality.

use std::sync::Arc;

use thiserror::Error;

pub mod http;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

use crate::bootstrap::BootstrappedServices;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// A thin, cheaply-cloneable wrapper around the bootstrapped services; all
/// business logic lives in `session`, `room`, and the other domain modules.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<BootstrappedServices>,
}

impl AppState {
    #[must_use]
    pub fn new(services: Arc<BootstrappedServices>) -> Self {
        Self { services }
    }
}

/// Builds the full axum router: recording endpoints plus the room hub
/// WebSocket.
#[must_use]
pub fn build_router(state: AppState) -> axum::Router {
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    axum::Router::new()
        .merge(http::routes())
        .merge(ws::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves the HTTP/WebSocket API until a shutdown signal fires.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind.
pub async fn start_server(
    state: AppState,
    bind_addr: std::net::SocketAddr,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    log::info!("[Server] Listening on http://{bind_addr}");

    let app = build_router(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    log::info!("[Server] Shutdown signal received");
    state.services.shutdown().await;
}
