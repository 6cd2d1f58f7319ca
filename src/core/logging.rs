//! Logging Initialization
//!
//! Installs a `tracing` registry with:
//! - a human-readable stdout layer,
//! - an optional JSON file layer (daily rolling) for ingestion,
//! - a `log` → `tracing` bridge so sqlx and redis records are captured.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "biblio-search.log";

/// Resolve the log directory (override or XDG data dir).
pub fn log_dir(config: &LoggingConfig) -> PathBuf {
    config.directory.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .map(|d| d.join("biblio-search").join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    })
}

/// Build the filter: `RUST_LOG` wins over the configured level.
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Initialize the logging system.
///
/// Returns the file writer's `WorkerGuard` when JSON file logging is enabled.
/// Keep it alive for the lifetime of the process so buffered lines are flushed.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(true)
        .with_filter(env_filter(config));

    let (file_layer, guard) = if config.json_file {
        let dir = log_dir(config);
        if let Err(e) = fs::create_dir_all(&dir) {
            eprintln!("Failed to create logs directory {}: {}", dir.display(), e);
        }
        let file_appender = tracing_appender::rolling::daily(&dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_target(true)
            .with_filter(env_filter(config));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Logging already initialized: {}", e);
        return guard;
    }

    // Redirect `log` records to `tracing`
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to initialize LogTracer: {}", e);
    }

    tracing::debug!(level = %config.level, json_file = config.json_file, "Logging initialized");
    guard
}
