//! File logging
//!
//! The terminal belongs to the chat UI, so everything goes to
//! `~/.gemini-chat/logs/gemini-chat.log` through a non-blocking writer.
//! `RUST_LOG` overrides the default filter.

use std::fs;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE: &str = "gemini-chat.log";
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// Flushes and closes the log file when dropped; keep it alive for the whole run
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

pub fn init() -> LoggingGuard {
    let log_dir = log_dir();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("[LOGGING] Failed to create log directory {}: {}", log_dir.display(), e);
    }

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init();

    tracing::info!(log_path = %log_path().display(), "Logging initialized");

    LoggingGuard {
        _file_guard: file_guard,
    }
}

fn log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".gemini-chat").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("gemini-chat-logs"))
}

pub fn log_path() -> PathBuf {
    log_dir().join(LOG_FILE)
}
