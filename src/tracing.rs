//! Tracing (logging)

use crate::error::SubsetError;

use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Returns the filter to apply to log events.
///
/// The `RUST_LOG` environment variable takes precedence. Otherwise events of this crate at
/// `level` and above are enabled.
pub fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("trackslice={}", level)))
}

/// Initlialise tracing (logging)
///
/// Log events are written to stdout, or to `log_file` without colour codes when one is given.
pub fn init_tracing(level: Level, log_file: Option<&str>) -> Result<(), SubsetError> {
    let registry = tracing_subscriber::registry().with(filter(level));
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    Ok(())
}
