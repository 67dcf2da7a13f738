use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use huddle_bridge::BridgeForwarder;
use huddle_core::BridgeApi;
use huddle_rooms::{Broadcaster, RoomRegistry};

use crate::{proxy, session};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub broadcaster: Broadcaster,
    pub forwarder: Arc<BridgeForwarder>,
    pub bridge: Arc<dyn BridgeApi>,
}

impl AppState {
    /// Wire the relay around one bridge implementation.
    pub fn new(bridge: Arc<dyn BridgeApi>, max_send_queue: usize) -> Self {
        let registry = Arc::new(RoomRegistry::new(max_send_queue));
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            forwarder: Arc::new(BridgeForwarder::new(Arc::clone(&bridge))),
            registry,
            bridge,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{room_id}", get(ws_handler))
        .route("/bridge_image/{file_id}", get(proxy::bridge_image))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle that keeps the accept loop alive.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "huddle server started");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
    })
}

pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

#[derive(Deserialize)]
struct JoinParams {
    username: String,
}

/// WebSocket upgrade for `/ws/{room_id}?username=...`.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(params): Query<JoinParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::run(socket, state, room_id, params.username))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (rooms, connections) = state.registry.counts();
    axum::Json(serde_json::json!({
        "status": "healthy",
        "rooms": rooms,
        "connections": connections,
    }))
}
