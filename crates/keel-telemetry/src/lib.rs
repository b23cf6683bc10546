//! Logging setup for Keel
//!
//! Installs a `tracing-subscriber` stack: an `EnvFilter`, a console `fmt`
//! layer, and optionally a daily-rolling file under `<home>/logs`.

#![allow(clippy::must_use_candidate)]

use std::path::{Path, PathBuf};

use keel_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;

const FILTER_ENV: &str = "RUST_LOG";
const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "keel.log";

/// Keeps the background file writer alive
///
/// Dropping the guard flushes buffered log lines.
pub struct LogGuard {
    file: Option<WorkerGuard>,
}

impl std::fmt::Debug for LogGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogGuard")
            .field("file", &self.file.is_some())
            .finish()
    }
}

/// Initialize logging for a server rooted at `home`
///
/// `RUST_LOG` takes precedence over the configured filter. If a global
/// subscriber is already installed (tests, embedding applications) the
/// existing one is kept.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created
pub fn init(home: &Path, config: &LoggingConfig) -> anyhow::Result<LogGuard> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let directives = filter_directives(config);
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let (file_layer, file_guard) = if config.file {
        let dir = log_dir(home);
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow::anyhow!("failed to create log directory {}: {e}", dir.display()))?;

        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        tracing::debug!("global subscriber already installed, keeping it");
    }

    Ok(LogGuard { file: file_guard })
}

/// Filter directives in effect: `RUST_LOG` if set and non-empty, else the configured filter
pub fn filter_directives(config: &LoggingConfig) -> String {
    std::env::var(FILTER_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.filter.clone())
}

/// Directory rolling log files are written to
pub fn log_dir(home: &Path) -> PathBuf {
    home.join(LOG_DIR)
}
