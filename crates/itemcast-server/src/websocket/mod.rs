//! WebSocket connection management, echo handling and broadcasting.

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod registry;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use connection::{ClientConnection, SendError};
pub use registry::ConnectionRegistry;
