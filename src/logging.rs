//! File-based logging
//!
//! Installs a `tracing` subscriber writing to `walltasks.log` in the data
//! directory. The file is truncated on every start.

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "walltasks.log";

/// Initialize logging into `dir`.
///
/// `RUST_LOG` takes precedence over `level`. Returns the writer guard that
/// must be held for the lifetime of the process, or `None` when the log
/// file could not be opened or a subscriber was already installed.
pub fn init(dir: &Path, level: &str) -> Option<WorkerGuard> {
    if let Err(e) = fs::create_dir_all(dir) {
        eprintln!("Failed to create log directory {:?}: {}", dir, e);
        return None;
    }

    let log_path = dir.join(LOG_FILE_NAME);
    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (writer, guard) = tracing_appender::non_blocking(file);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    if installed.is_err() {
        return None;
    }

    tracing::info!("=== walltasks log started ===");
    Some(guard)
}
