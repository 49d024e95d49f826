//! # itemcast-logging
//!
//! Installs the global `tracing` subscriber. Output goes to stderr, either
//! compact single-line text or one JSON object per line. `RUST_LOG` overrides
//! the configured level when it is set.

#![deny(unsafe_code)]

use itemcast_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the configured level parses.
const FALLBACK_FILTER: &str = "info";

/// Build the env filter: `RUST_LOG` first, then `level`, then `info`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
}

/// Initialize the global subscriber.
///
/// Call once at startup. Later calls are no-ops, so tests may call it freely.
pub fn init_subscriber(settings: &LoggingSettings) {
    let filter = build_filter(&settings.level);

    match settings.format {
        LogFormat::Compact => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact()
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .try_init();
        }
    }
}
