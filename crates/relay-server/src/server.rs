//! `RelayServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::response::{Json, Response};
use axum::routing::{delete, get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::ConnectionId;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::relay::{DisconnectReason, Relay};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{Route, SessionOptions, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry and dispatchers.
    pub relay: Arc<Relay>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    relay: Arc<Relay>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl RelayServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        Self {
            relay: Arc::new(Relay::new(&config)),
            config: Arc::new(config),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws/text", get(ws_text_handler))
            .route("/ws/text/{target}", get(ws_targeted_handler))
            .route("/ws/image", get(ws_image_handler))
            .route("/broadcast/text", post(api::broadcast_text))
            .route("/broadcast/image", post(api::broadcast_image))
            .route("/connections", get(api::list_connections))
            .route("/connections/{id}", delete(api::close_connection))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(DefaultBodyLimit::max(self.config.max_message_size))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    /// The task ends after [`ShutdownCoordinator::shutdown`] once every live
    /// session has been disconnected.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();
        let relay = self.relay.clone();

        let handle = tokio::spawn(async move {
            let signal = async move {
                token.cancelled().await;
                let closed = relay.lifecycle().disconnect_all(DisconnectReason::Shutdown);
                info!(closed, "sessions closed for shutdown");
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "server error");
            }
            info!("server stopped");
        });

        info!(%addr, "relay server listening");
        Ok((addr, handle))
    }

    /// Registry and dispatchers.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn upgrade(ws: WebSocketUpgrade, state: &AppState, route: Route) -> Response {
    let options = SessionOptions::from(state.config.as_ref());
    let relay = state.relay.clone();
    let shutdown = state.shutdown.token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, relay, route, options, shutdown))
}

/// GET /ws/text
async fn ws_text_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    upgrade(ws, &state, Route::Broadcast)
}

/// GET /ws/text/{target}
async fn ws_targeted_handler(
    ws: WebSocketUpgrade,
    Path(target): Path<String>,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, &state, Route::Targeted(ConnectionId::from_string(target)))
}

/// GET /ws/image
async fn ws_image_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    upgrade(ws, &state, Route::Image)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.relay.registry(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}
