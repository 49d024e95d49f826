//! Event fan-out to connected websocket clients.

use std::sync::Arc;

use itemcast_core::ItemEvent;
use metrics::counter;
use tracing::{debug, warn};

use super::connection::SendError;
use super::registry::ConnectionRegistry;
use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_BROADCASTS_TOTAL};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot.
    pub attempted: usize,
    /// Frames enqueued.
    pub delivered: usize,
    /// Frames not enqueued, whether the queue was full or closed.
    pub dropped: usize,
    /// Connections removed because their queue was closed.
    pub evicted: usize,
}

/// Delivers messages to every registered connection.
///
/// Sends are enqueued with `try_send`, so a broadcast never waits on a socket
/// and one slow or closing client cannot hold up the others.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this broadcaster delivers to.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Send `message` to every connection registered at call time.
    ///
    /// A full queue drops this frame only. A closed queue also evicts the
    /// connection from the registry. Neither is reported as an error.
    pub fn broadcast(&self, message: &str) -> BroadcastReport {
        let recipients = self.registry.all();
        let mut report = BroadcastReport {
            attempted: recipients.len(),
            ..BroadcastReport::default()
        };
        counter!(WS_BROADCASTS_TOTAL).increment(1);

        if recipients.is_empty() {
            debug!("broadcast with no recipients");
            return report;
        }

        let frame = Arc::new(message.to_owned());
        for conn in &recipients {
            match conn.send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(SendError::Full) => {
                    report.dropped += 1;
                    warn!(
                        conn_id = %conn.id(),
                        dropped = conn.drop_count(),
                        "outbound queue full, dropping broadcast frame"
                    );
                }
                Err(SendError::Closed) => {
                    report.dropped += 1;
                    if self.registry.deregister(conn.id()) {
                        report.evicted += 1;
                    }
                    warn!(conn_id = %conn.id(), "outbound queue closed, evicting connection");
                }
            }
        }

        if report.dropped > 0 {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(report.dropped as u64);
        }
        debug!(
            recipients = report.attempted,
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast complete"
        );
        report
    }

    /// Serialize `event` and broadcast it.
    pub fn broadcast_event(&self, event: &ItemEvent) -> BroadcastReport {
        match event.to_json() {
            Ok(json) => {
                debug!(action = %event.action(), key = event.key(), "broadcasting item event");
                self.broadcast(&json)
            }
            Err(e) => {
                warn!(action = %event.action(), error = %e, "failed to serialize event");
                BroadcastReport::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::websocket::connection::ClientConnection;

    fn setup() -> (Broadcaster, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        (Broadcaster::new(Arc::clone(&registry)), registry)
    }

    fn add(
        registry: &ConnectionRegistry,
        id: &str,
        capacity: usize,
    ) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(capacity);
        registry.register(Arc::new(ClientConnection::new(id.into(), tx)));
        rx
    }

    #[test]
    fn empty_registry_is_noop() {
        let (broadcaster, _registry) = setup();
        let report = broadcaster.broadcast("hello");
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn all_connections_receive_identical_content() {
        let (broadcaster, registry) = setup();
        let mut receivers: Vec<_> = (0..5)
            .map(|i| add(&registry, &format!("c{i}"), 8))
            .collect();

        let report = broadcaster.broadcast("payload");
        assert_eq!(report.attempted, 5);
        assert_eq!(report.delivered, 5);

        for rx in &mut receivers {
            assert_eq!(&*rx.recv().await.unwrap(), "payload");
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn closed_connection_does_not_block_others() {
        let (broadcaster, registry) = setup();
        let mut rx_a = add(&registry, "a", 8);
        let rx_b = add(&registry, "b", 8);
        let mut rx_c = add(&registry, "c", 8);
        drop(rx_b);

        let report = broadcaster.broadcast("x");
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.evicted, 1);

        assert_eq!(&*rx_a.recv().await.unwrap(), "x");
        assert_eq!(&*rx_c.recv().await.unwrap(), "x");
        assert!(!registry.contains(&"b".into()));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn full_queue_drops_frame_but_keeps_connection() {
        let (broadcaster, registry) = setup();
        let mut slow = add(&registry, "slow", 1);
        let mut fast = add(&registry, "fast", 8);

        let _ = broadcaster.broadcast("one");
        let report = broadcaster.broadcast("two");
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.evicted, 0);
        assert!(registry.contains(&"slow".into()));

        assert_eq!(&*slow.recv().await.unwrap(), "one");
        assert!(slow.try_recv().is_err());
        assert_eq!(&*fast.recv().await.unwrap(), "one");
        assert_eq!(&*fast.recv().await.unwrap(), "two");

        let all = registry.all();
        let conn = all.iter().find(|c| c.id().as_str() == "slow").unwrap();
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_event_uses_wire_format() {
        let (broadcaster, registry) = setup();
        let mut rx = add(&registry, "a", 8);

        let _ = broadcaster.broadcast_event(&ItemEvent::created("x", "1"));
        let _ = broadcaster.broadcast_event(&ItemEvent::deleted("x"));

        assert_eq!(
            &*rx.recv().await.unwrap(),
            r#"{"action":"created","key":"x","value":"1"}"#
        );
        assert_eq!(
            &*rx.recv().await.unwrap(),
            r#"{"action":"deleted","key":"x"}"#
        );
    }

    #[tokio::test]
    async fn deregistered_connection_receives_nothing() {
        let (broadcaster, registry) = setup();
        let mut rx = add(&registry, "a", 8);
        let _ = registry.deregister(&"a".into());

        let report = broadcaster.broadcast("late");
        assert_eq!(report.attempted, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn clones_share_registry() {
        let (broadcaster, registry) = setup();
        let other = broadcaster.clone();
        assert!(Arc::ptr_eq(other.registry(), &registry));
    }
}
