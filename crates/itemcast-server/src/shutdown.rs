//! Graceful shutdown: stop accepting, close websockets, wait for both.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::websocket::ConnectionRegistry;

/// How often the registry is checked while waiting for handlers to exit.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared shutdown signal for the listener and every websocket handler.
///
/// Cancelling the token ends `axum::serve` and makes each handler leave its
/// read loop, which deregisters it and closes its socket.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    registry: Arc<ConnectionRegistry>,
}

impl ShutdownCoordinator {
    /// Create a coordinator that waits on `registry` to empty.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
        }
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Signal shutdown, then wait up to `timeout` for the serve task to end
    /// and every websocket to deregister.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn drain(&self, server: JoinHandle<()>, timeout: Duration) -> bool {
        self.shutdown();
        info!(
            connections = self.registry.len(),
            timeout_secs = timeout.as_secs(),
            "draining server"
        );

        let connections_closed = async {
            while !self.registry.is_empty() {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        };
        let drained = async {
            let (joined, ()) = futures::future::join(server, connections_closed).await;
            if let Err(e) = joined {
                warn!(error = %e, "serve task failed");
            }
        };

        if tokio::time::timeout(timeout, drained).await.is_err() {
            warn!(
                remaining = self.registry.len(),
                "shutdown timed out after {timeout:?}"
            );
            return false;
        }
        info!("server drained");
        true
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::websocket::ClientConnection;

    fn register(registry: &ConnectionRegistry, id: &str) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(4);
        registry.register(Arc::new(ClientConnection::new(id.into(), tx)));
        rx
    }

    #[test]
    fn shutdown_propagates_to_tokens() {
        let coord = ShutdownCoordinator::new(Arc::new(ConnectionRegistry::new()));
        let token = coord.token();
        assert!(!token.is_cancelled());
        coord.shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_server_and_connections() {
        let registry = Arc::new(ConnectionRegistry::new());
        let _rx = register(&registry, "a");
        let coord = ShutdownCoordinator::new(Arc::clone(&registry));

        // Stands in for a websocket handler leaving on cancellation.
        let token = coord.token();
        let handler_registry = Arc::clone(&registry);
        let _handler = tokio::spawn(async move {
            token.cancelled().await;
            let _ = handler_registry.deregister(&"a".into());
        });
        let token = coord.token();
        let server = tokio::spawn(async move { token.cancelled().await });

        assert!(coord.drain(server, Duration::from_secs(5)).await);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_on_stuck_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let _rx = register(&registry, "stuck");
        let coord = ShutdownCoordinator::new(Arc::clone(&registry));
        let server = tokio::spawn(async {});

        assert!(!coord.drain(server, Duration::from_millis(50)).await);
        assert!(coord.token().is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_on_stuck_server() {
        let coord = ShutdownCoordinator::new(Arc::new(ConnectionRegistry::new()));
        let server = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert!(!coord.drain(server, Duration::from_millis(50)).await);
    }
}
