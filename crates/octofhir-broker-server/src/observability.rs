//! Tracing setup for the broker binary.
//!
//! The subscriber is installed once at startup with a reloadable filter so
//! `logging.level` from the configuration file can take effect after the
//! file has been read. `RUST_LOG`, when set, wins over both.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

/// Level used until the configuration has been loaded.
pub const STARTUP_LEVEL: &str = "info";

/// Installs the global subscriber at [`STARTUP_LEVEL`].
pub fn init_tracing() {
    init_tracing_with_level(STARTUP_LEVEL);
}

/// Installs the global subscriber, filtering at `level` unless `RUST_LOG` is set.
///
/// A second call leaves the first subscriber in place and reports why.
pub fn init_tracing_with_level(level: &str) {
    let filter = match env_override() {
        Some(filter) => filter,
        None => level_filter(level).unwrap_or_else(|err| {
            eprintln!("Warning: invalid log level '{level}' ({err}), using '{STARTUP_LEVEL}'");
            EnvFilter::new(STARTUP_LEVEL)
        }),
    };

    let (reload_layer, handle) = reload::Layer::new(filter);

    if let Err(err) = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init()
    {
        // Another subscriber owns the process; it receives this event.
        tracing::warn!(error = %err, "Tracing already initialized, keeping existing subscriber");
        return;
    }

    if FILTER_HANDLE.set(handle).is_err() {
        tracing::warn!("Log filter handle already registered, level changes may not apply");
    }
}

/// Switches the active filter to the configured `level`.
///
/// Does nothing when `RUST_LOG` is set. Failures are logged and the
/// previous filter stays active.
pub fn apply_logging_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing::debug!(level, "RUST_LOG is set, ignoring configured log level");
        return;
    }

    let Some(handle) = FILTER_HANDLE.get() else {
        tracing::warn!(level, "Tracing not initialized by this binary, cannot apply log level");
        return;
    };

    let filter = match level_filter(level) {
        Ok(filter) => filter,
        Err(err) => {
            tracing::warn!(level, error = %err, "Invalid log level, keeping current filter");
            return;
        }
    };

    match handle.modify(|current| *current = filter) {
        Ok(()) => tracing::debug!(level, "Applied configured log level"),
        Err(err) => tracing::warn!(level, error = %err, "Failed to apply configured log level"),
    }
}

fn env_override() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Some(filter),
        Err(err) => {
            eprintln!("Warning: ignoring unparsable RUST_LOG ({err})");
            None
        }
    }
}

/// Parses a configured level such as `debug` or `octofhir_broker=trace,info`.
fn level_filter(level: &str) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    EnvFilter::try_new(level.trim())
}
