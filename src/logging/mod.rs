//! Logging initialisation: env-filtered console output with optional JSON
//! formatting and an optional non-blocking file layer.

use crate::Result;
use anyhow::anyhow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_LEVEL: &str = "info";
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Keeps the non-blocking file writer alive for the duration of the
/// process.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialise the tracing subscriber once per process.
pub fn init(verbose: bool, json: bool, log_file: Option<&Path>) -> Result<LoggingGuard> {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(anyhow!("logging already initialized"));
    }

    let default_level = if verbose { "debug" } else { DEFAULT_LOG_LEVEL };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let mut file_guard = None;
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            file_guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|err| anyhow!("failed to initialize logging: {}", err))?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|err| anyhow!("failed to initialize logging: {}", err))?;
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
