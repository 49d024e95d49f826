//! HTTP surface: item CRUD, the browser client, health and metrics.

pub mod index;
pub mod items;
pub mod payload;
