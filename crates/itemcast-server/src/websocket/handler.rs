//! Per-connection lifecycle: register, echo until disconnect, deregister.
//!
//! ```text
//! Accepting ──upgrade──▶ Open ──close / error / end──▶ Closed
//!                         │ ▲
//!                         └─┘ text frame → "echo: <text>"
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use itemcast_core::ConnectionId;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// Prefix prepended to every echoed text frame.
pub const ECHO_PREFIX: &str = "echo: ";

/// How long the writer may keep flushing after the reader has stopped.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade completed, not yet registered.
    Accepting,
    /// Registered and exchanging frames.
    Open,
    /// Deregistered; no further frames are processed.
    Closed,
}

/// Reply sent back for an inbound text frame.
pub fn echo_reply(text: &str) -> String {
    format!("{ECHO_PREFIX}{text}")
}

/// Removes the connection from the registry when dropped.
///
/// Held for the whole `Open` state, so deregistration runs however the
/// handler exits, including unwinding.
struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl RegistrationGuard {
    fn register(registry: Arc<ConnectionRegistry>, connection: Arc<ClientConnection>) -> Self {
        let id = connection.id().clone();
        registry.register(connection);
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        Self { registry, id }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        let _ = self.registry.deregister(&self.id);
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        debug!(conn_id = %self.id, state = ?ConnectionState::Closed, "connection state");
    }
}

/// Run one upgraded websocket until it disconnects or `shutdown` fires.
#[instrument(skip_all, fields(conn_id))]
pub async fn handle_socket(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    queue_capacity: usize,
    shutdown: CancellationToken,
) {
    let (connection, rx) = ClientConnection::channel(queue_capacity);
    let connection = Arc::new(connection);
    let id = connection.id().clone();
    let _ = tracing::Span::current().record("conn_id", id.as_str());
    debug!(state = ?ConnectionState::Accepting, "connection state");

    let (ws_tx, mut ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(ws_tx, rx, id.clone()));

    let guard = RegistrationGuard::register(Arc::clone(&registry), Arc::clone(&connection));
    info!(conn_id = %id, "websocket client connected");
    debug!(state = ?ConnectionState::Open, "connection state");

    let mut writer_finished = false;
    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = Arc::new(echo_reply(text.as_str()));
                    if connection.send_wait(reply).await.is_err() {
                        debug!(conn_id = %id, "outbound queue closed during echo");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // axum answers pings; binary frames carry nothing for us.
                Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %id, error = %e, "websocket receive error");
                    break;
                }
            },
            _ = &mut writer => {
                writer_finished = true;
                break;
            }
            () = shutdown.cancelled() => {
                debug!(conn_id = %id, "closing for server shutdown");
                break;
            }
        }
    }

    drop(guard);
    info!(
        conn_id = %id,
        age_ms = u64::try_from(connection.age().as_millis()).unwrap_or(u64::MAX),
        dropped = connection.drop_count(),
        "websocket client disconnected"
    );
    // Last sender: the writer sees the queue close and sends a close frame.
    drop(connection);

    if !writer_finished && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Drain the outbound queue into the socket until the queue closes or a
/// write fails.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<String>>,
    id: ConnectionId,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = ws_tx.send(Message::Text(frame.as_str().into())).await {
            debug!(conn_id = %id, error = %e, "websocket write failed");
            return;
        }
    }
    if let Err(e) = ws_tx.close().await {
        debug!(conn_id = %id, error = %e, "websocket close failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_prefixes_text() {
        assert_eq!(echo_reply("ping"), "echo: ping");
        assert_eq!(echo_reply(""), "echo: ");
    }

    #[test]
    fn echo_preserves_unicode() {
        assert_eq!(echo_reply("héllo ✓"), "echo: héllo ✓");
    }

    #[test]
    fn guard_deregisters_on_drop() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, _rx) = ClientConnection::channel(4);
        let id = conn.id().clone();

        let guard = RegistrationGuard::register(Arc::clone(&registry), Arc::new(conn));
        assert!(registry.contains(&id));
        drop(guard);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn guard_tolerates_prior_eviction() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, _rx) = ClientConnection::channel(4);
        let id = conn.id().clone();

        let guard = RegistrationGuard::register(Arc::clone(&registry), Arc::new(conn));
        assert!(registry.deregister(&id));
        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn guard_deregisters_on_panic() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, _rx) = ClientConnection::channel(4);
        let id = conn.id().clone();
        let conn = Arc::new(conn);

        let inner = Arc::clone(&registry);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = RegistrationGuard::register(inner, conn);
            panic!("handler failed");
        }));
        assert!(result.is_err());
        assert!(!registry.contains(&id));
    }
}
