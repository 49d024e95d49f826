//! Set of currently open websocket connections.

use std::collections::HashMap;
use std::sync::Arc;

use itemcast_core::ConnectionId;
use parking_lot::RwLock;
use tracing::debug;

use super::connection::ClientConnection;

/// Open connections indexed by id.
///
/// Every method takes the lock for the duration of a map operation only;
/// callers iterate over the snapshot returned by [`all`](Self::all).
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    pub fn register(&self, connection: Arc<ClientConnection>) {
        let id = connection.id().clone();
        let total = {
            let mut conns = self.connections.write();
            let _ = conns.insert(id.clone(), connection);
            conns.len()
        };
        debug!(conn_id = %id, total, "connection registered");
    }

    /// Remove a connection. Returns whether it was present.
    pub fn deregister(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.write().remove(id).is_some();
        if removed {
            debug!(conn_id = %id, "connection deregistered");
        }
        removed
    }

    /// Snapshot of the current members, in no particular order.
    pub fn all(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
