//! # itemcast-settings
//!
//! Configuration for the itemcast server, layered with `figment`:
//!
//! 1. Compiled defaults ([`Settings::default`])
//! 2. A JSON file (`--config <path>`, or `itemcast.json` in the working
//!    directory when present)
//! 3. Environment variables prefixed `ITEMCAST_`, with `__` separating
//!    nested keys (`ITEMCAST_SERVER__PORT=9000`)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, ENV_PREFIX};
pub use types::{LogFormat, LoggingSettings, ServerSettings, Settings, StoreSettings};
