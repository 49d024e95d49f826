//! Settings loading.
//!
//! Sources are merged in increasing priority: defaults, JSON file,
//! environment. A missing default file (`itemcast.json`) is skipped; a
//! missing file passed explicitly is an error.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::Settings;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "ITEMCAST_";

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "itemcast.json";

/// Build the layered figment without extracting it.
pub fn figment(path: Option<&Path>) -> Figment {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    Figment::from(Serialized::defaults(Settings::default()))
        .merge(Json::file(file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate settings.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(SettingsError::NotFound(path.to_path_buf()));
        }
        debug!(?path, "loading settings from file");
    }

    let settings: Settings = figment(path).extract()?;
    settings.validate()?;
    Ok(settings)
}
