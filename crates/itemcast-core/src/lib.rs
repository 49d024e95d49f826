//! # itemcast-core
//!
//! Shared vocabulary for the itemcast crates:
//!
//! - **Events**: [`events::ItemEvent`], the change notification pushed to
//!   websocket clients, and its JSON wire encoding
//! - **IDs**: [`ids::ConnectionId`] for websocket connections
//! - **Greeting**: the [`greeting::greet`] helper behind `itemcast greet`

#![deny(unsafe_code)]

pub mod events;
pub mod greeting;
pub mod ids;

pub use events::{ItemAction, ItemEvent};
pub use ids::ConnectionId;
