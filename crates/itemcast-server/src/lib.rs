//! # itemcast-server
//!
//! Axum HTTP + `WebSocket` server and item change broadcasting.
//!
//! - HTTP endpoints: item CRUD, index page, health check, Prometheus metrics
//! - `WebSocket` gateway: connection registry, echo loop, per-connection writer
//! - Every successful mutation is serialized once and fanned out to all
//!   registered connections without awaiting any socket write
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod error;
pub mod health;
pub mod http;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use error::ApiError;
pub use server::{AppState, ItemcastServer};
