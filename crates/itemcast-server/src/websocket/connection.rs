//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use itemcast_core::ConnectionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Why a frame could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The outbound queue is at capacity; this frame was dropped.
    #[error("outbound queue full")]
    Full,
    /// The writer task has gone away; the connection is closing.
    #[error("outbound queue closed")]
    Closed,
}

/// A connected websocket client.
///
/// Holds the sending half of the bounded queue drained by the connection's
/// writer task. Sending never touches the socket.
#[derive(Debug)]
pub struct ClientConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection around an existing queue sender.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create a connection with a fresh id and a queue of `capacity` frames.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(ConnectionId::new(), tx), rx)
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Enqueue a frame without waiting.
    ///
    /// On failure the dropped-message counter is incremented.
    pub fn send(&self, message: Arc<String>) -> Result<(), SendError> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                match e {
                    TrySendError::Full(_) => Err(SendError::Full),
                    TrySendError::Closed(_) => Err(SendError::Closed),
                }
            }
        }
    }

    /// Enqueue a frame, waiting for queue capacity.
    ///
    /// Only fails when the queue is closed.
    pub async fn send_wait(&self, message: Arc<String>) -> Result<(), SendError> {
        self.tx.send(message).await.map_err(|_| SendError::Closed)
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
