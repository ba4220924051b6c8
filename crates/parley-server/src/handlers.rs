//! HTTP handlers for the Parley server.
//!
//! Routes the WebSocket endpoint, a health check, and static assets for
//! every other path. Each upgraded socket is handed to a session.

use crate::config::Config;
use crate::metrics;
use crate::session;
use crate::shutdown::ShutdownController;
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use parley_core::Hub;
use parley_transport::{WebSocketConfig, WebSocketConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{debug, error, info};

/// Oversized frames up to this multiple of the configured limit still get
/// an error reply; beyond it the socket itself is dropped.
const SOCKET_LIMIT_FACTOR: usize = 4;

/// Shared server state.
pub struct AppState {
    /// The broadcast hub.
    pub hub: Hub,
    /// Server configuration.
    pub config: Config,
    /// Shutdown coordination.
    pub shutdown: ShutdownController,
}

impl AppState {
    /// Create new app state, spawning the hub.
    #[must_use]
    pub fn new(config: Config, shutdown: ShutdownController) -> Self {
        Self {
            hub: Hub::spawn_with_config((&config.hub).into()),
            config,
            shutdown,
        }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(&state.config.transport.asset_dir))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP/WebSocket server until shutdown.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config, shutdown: ShutdownController) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config, shutdown))).await
}

/// Serve on an already bound listener until shutdown is initiated.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
    .await?;

    info!("Server stopped accepting connections");
    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.hub.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "subscribers": stats.subscriber_count,
                "history": stats.history_len,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "version": env!("CARGO_PKG_VERSION"),
                "error": e.to_string(),
            })),
        ),
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let config = WebSocketConfig {
        max_message_size: state.config.transport.max_message_size,
    };
    debug!(remote = %remote, "WebSocket upgrade");

    ws.max_message_size(config.max_message_size.saturating_mul(SOCKET_LIMIT_FACTOR))
        .on_upgrade(move |socket| async move {
            let conn = WebSocketConnection::new(socket, Some(remote), &config);
            session::run_session(Box::new(conn), state.hub.clone(), state.shutdown.clone()).await;
        })
}
