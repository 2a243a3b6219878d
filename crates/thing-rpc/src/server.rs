//! HTTP server implementation using Axum.

use crate::handler::{handle_health, handle_rpc};
use crate::ws::handle_new_things_ws;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thing_registry::{LocalDiscovery, PathsConfig, ThingsApi};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Maximum number of JSON-RPC requests processed at once.
const MAX_CONCURRENT_RPC: usize = 64;

/// Application state shared across handlers.
pub struct AppState {
    /// Registry, reconciliation and subscriber hub
    pub api: ThingsApi,
    /// Discovery subsystem that device adapters report into
    pub discovery: Arc<LocalDiscovery>,
}

/// Build the router for the given state.
pub fn router(state: Arc<AppState>) -> Router {
    // Configure CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let rpc = post(handle_rpc).layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_RPC));

    Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", rpc)
        .route(PathsConfig::NEW_THINGS_PATH, get(handle_new_things_ws))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    api: ThingsApi,
    discovery: Arc<LocalDiscovery>,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let state = Arc::new(AppState { api, discovery });
    let app = router(state);

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
