//! Console logging plus optional rotating JSON log files.
//!
//! - `ORBIT_FILE_LOGGING`: "true" or "1" enables file output
//! - `ORBIT_LOG_DIR`: log directory (defaults to `{asset_dir}/logs`)
//! - `ORBIT_LOG_MAX_FILES`: daily files to retain (default 7)
//!
//! File lines are JSON:
//! ```json
//! {"timestamp":"2026-01-05T10:30:00Z","level":"INFO","target":"server","message":"..."}
//! ```

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};
use utils::assets::log_dir;

const LOG_FILE_PREFIX: &str = "orbit.log";

#[derive(Debug, Clone)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub log_dir: PathBuf,
    /// Number of daily log files to retain.
    pub max_files: usize,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        let enabled = std::env::var("ORBIT_FILE_LOGGING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_files = std::env::var("ORBIT_LOG_MAX_FILES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7);

        Self {
            enabled,
            log_dir: log_dir(),
            max_files,
        }
    }
}

/// Filter directive for our crates at `log_level`, everything else at warn.
pub fn filter_directive(log_level: &str) -> String {
    format!("warn,server={log_level},services={log_level},db={log_level},utils={log_level}")
}

/// `RUST_LOG` as a full directive when set, otherwise our crates at `default_level`.
fn env_filter(default_level: &str) -> EnvFilter {
    let raw = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    build_filter(raw.as_deref(), default_level)
}

fn build_filter(raw: Option<&str>, default_level: &str) -> EnvFilter {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => EnvFilter::try_new(raw).unwrap_or_else(|e| {
            eprintln!("Invalid RUST_LOG {raw:?} ({e}), falling back to {default_level}");
            EnvFilter::new(filter_directive(default_level))
        }),
        None => EnvFilter::new(filter_directive(default_level)),
    }
}

/// Install the global subscriber. `default_level` applies when `RUST_LOG` is unset.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the process. `None` when file logging is disabled.
pub fn init_logging(default_level: &str) -> Option<WorkerGuard> {
    let config = FileLoggingConfig::default();
    let console_layer = tracing_subscriber::fmt::layer().with_filter(env_filter(default_level));

    if !config.enabled {
        tracing_subscriber::registry().with(console_layer).init();
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("Failed to create log directory {:?}: {}", config.log_dir, e);
        tracing_subscriber::registry().with(console_layer).init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(env_filter(default_level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = ?config.log_dir,
        max_files = config.max_files,
        "File logging enabled"
    );

    let log_dir = config.log_dir.clone();
    let max_files = config.max_files;
    std::thread::spawn(move || {
        cleanup_old_logs(&log_dir, max_files);
    });

    Some(guard)
}

/// Keep only the newest `max_files` log files.
fn cleanup_old_logs(log_dir: &Path, max_files: usize) {
    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .filter_map(|e| {
            e.metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|t| (e.path(), t))
        })
        .collect();

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.into_iter().skip(max_files) {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            tracing::debug!("Removed old log file: {:?}", path);
        }
    }
}
