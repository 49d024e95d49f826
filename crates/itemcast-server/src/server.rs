//! `ItemcastServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use itemcast_settings::ServerSettings;
use itemcast_store::ItemRepo;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::ApiError;
use crate::health::{self, HealthResponse};
use crate::http::{index, items};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler;
use crate::websocket::{Broadcaster, ConnectionRegistry};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Open websocket connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out over `registry`.
    pub broadcaster: Broadcaster,
    /// Item store.
    pub items: ItemRepo,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics_handle: PrometheusHandle,
    /// Outbound queue capacity per connection.
    pub send_queue_capacity: usize,
    /// Largest inbound websocket message, in bytes.
    pub max_message_size: usize,
    /// Cancelled when the server shuts down; closes open websockets.
    pub shutdown: CancellationToken,
}

/// The itemcast server.
pub struct ItemcastServer {
    settings: ServerSettings,
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ItemcastServer {
    /// Create a server over `items`.
    pub fn new(settings: ServerSettings, items: ItemRepo, metrics_handle: PrometheusHandle) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let shutdown = Arc::new(ShutdownCoordinator::new(Arc::clone(&registry)));
        let state = AppState {
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
            items,
            start_time: Instant::now(),
            metrics_handle,
            send_queue_capacity: settings.send_queue_capacity,
            max_message_size: settings.max_message_size,
            shutdown: shutdown.token(),
        };
        Self {
            settings,
            state,
            shutdown,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index::index))
            .route("/static/app.js", get(index::app_js))
            .route("/items", get(items::list_items).post(items::create_item))
            .route(
                "/items/{key}",
                get(items::get_item)
                    .put(items::update_item)
                    .delete(items::delete_item),
            )
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which ends once [`shutdown`](Self::shutdown) is triggered and in-flight
    /// requests complete. Open websockets are closed by the same signal.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "itemcast server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
            info!("itemcast server stopped");
        });

        Ok((local_addr, handle))
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// The broadcaster.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.state.broadcaster
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let registry = Arc::clone(&state.registry);
    let capacity = state.send_queue_capacity;
    let shutdown = state.shutdown.clone();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| handler::handle_socket(socket, registry, capacity, shutdown))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let items = state.items.count()?;
    Ok(Json(health::health_check(
        state.start_time,
        state.registry.len(),
        items,
    )))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use itemcast_store::Database;
    use tower::ServiceExt;

    use super::*;
    use crate::metrics::detached_handle;

    fn make_server() -> ItemcastServer {
        let items = ItemRepo::new(Database::in_memory().unwrap());
        ItemcastServer::new(ServerSettings::default(), items, detached_handle())
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        (status, body.to_vec())
    }

    #[test]
    fn server_with_default_settings() {
        let server = make_server();
        assert_eq!(server.settings().host, "127.0.0.1");
        assert_eq!(server.settings().port, 8000);
        assert!(server.registry().is_empty());
        assert!(!server.shutdown().token().is_cancelled());
    }

    #[test]
    fn broadcaster_shares_registry() {
        let server = make_server();
        assert!(Arc::ptr_eq(server.broadcaster().registry(), server.registry()));
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let _ = server.state.items.upsert("a", "1").unwrap();
        let (status, body) = get(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["items"], 1);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn index_serves_html() {
        let (status, body) = get(make_server().router(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("<html"));
    }

    #[tokio::test]
    async fn script_is_served() {
        let (status, body) = get(make_server().router(), "/static/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let (status, _) = get(make_server().router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_rejected() {
        let (status, _) = get(make_server().router(), "/ws").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (status, _) = get(make_server().router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_and_shutdown() {
        let settings = ServerSettings {
            port: 0,
            ..ServerSettings::default()
        };
        let items = ItemRepo::new(Database::in_memory().unwrap());
        let server = ItemcastServer::new(settings, items, detached_handle());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
