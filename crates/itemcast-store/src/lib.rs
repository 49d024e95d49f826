//! # itemcast-store
//!
//! Key-value item persistence on `SQLite`.
//!
//! [`Database`] owns a single connection behind a mutex; [`ItemRepo`] exposes
//! the list / get / upsert / delete operations the HTTP layer calls before it
//! broadcasts a change.

#![deny(unsafe_code)]

pub mod database;
pub mod error;
pub mod items;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use items::{Item, ItemRepo};
