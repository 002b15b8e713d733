//! Logging initialization.
//!
//! Installs a `tracing-subscriber` registry writing to stderr, filtered by
//! `RUST_LOG` when set and by the configured level otherwise. Command
//! output on stdout stays machine-readable.

use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Single-line human-readable records.
    #[default]
    Compact,
}

/// Initializes logging. Subsequent calls are no-ops.
pub fn init_logging(format: LogFormat, default_level: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            LogFormat::Compact => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().compact().with_writer(std::io::stderr))
                    .init();
            }
        }
    });
}
