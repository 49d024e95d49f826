//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// A source could not be read or did not match the settings shape.
    #[error("failed to load settings: {0}")]
    Load(Box<figment::Error>),
    /// A value parsed but is out of range.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

impl From<figment::Error> for SettingsError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = SettingsError::NotFound(PathBuf::from("/nope/itemcast.json"));
        assert_eq!(err.to_string(), "config file not found: /nope/itemcast.json");
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("send_queue_capacity must be > 0".into());
        assert_eq!(
            err.to_string(),
            "invalid settings value: send_queue_capacity must be > 0"
        );
    }

    #[test]
    fn figment_error_converts() {
        let err: SettingsError = figment::Error::from("boom".to_string()).into();
        assert!(matches!(err, SettingsError::Load(_)));
        assert!(err.to_string().contains("boom"));
    }
}
