//! File logging under `<home>/logs/photobox.log`.
//!
//! Stdout/stderr stay reserved for user-facing output; diagnostics go to the
//! log file only. The filter comes from `PHOTOBOX_LOG` (default `info`).

use std::fs::{self, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "PHOTOBOX_LOG";
pub const LOG_FILE_NAME: &str = "photobox.log";
const DEFAULT_FILTER: &str = "info";

/// Keeps the background writer alive; dropping it flushes pending lines.
pub struct LogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Builds the filter from `PHOTOBOX_LOG`, falling back to `info` when unset
/// or unparseable.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber writing to `logs_dir/photobox.log`.
///
/// # Errors
/// Returns an error if the log directory or file cannot be created.
pub fn init_logging(logs_dir: &Path) -> Result<LogGuard> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create log directory {}", logs_dir.display()))?;

    let log_path = logs_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    // A subscriber may already be installed (tests, embedding); keep it.
    if tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global subscriber already set; file logging not installed");
    }

    Ok(LogGuard { _guard: guard })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_init_logging_creates_log_file() {
        let dir = tempdir().unwrap();
        let logs = dir.path().join("logs");

        let guard = init_logging(&logs).unwrap();
        drop(guard);

        assert!(logs.join(LOG_FILE_NAME).exists());
    }

    #[test]
    fn test_init_logging_fails_when_dir_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("logs");
        fs::write(&blocker, "file").unwrap();

        assert!(init_logging(&blocker).is_err());
    }
}
