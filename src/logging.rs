//! Centralized logging infrastructure for WindowCloak
//!
//! This module provides:
//! - Structured logging with tracing
//! - Configurable log levels (Off, Error, Warn, Info, Debug, Trace)
//! - Automatic daily log rotation
//! - Cross-platform log file locations

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

use windowcloak_capture::config;

lazy_static! {
    // Global handle for reloading log level dynamically
    static ref LOG_RELOAD_HANDLE: Mutex<Option<Handle<EnvFilter, Registry>>> = Mutex::new(None);
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            LogLevel::Off => "Off",
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        };
        write!(f, "{}", value)
    }
}

impl From<LogLevel> for Option<Level> {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Get the platform-specific logs directory
pub fn get_logs_dir() -> Result<PathBuf> {
    let logs_dir = if cfg!(target_os = "macos") {
        // macOS: ~/Library/Logs/WindowCloak
        dirs::home_dir()
            .context("Failed to get home directory")?
            .join("Library")
            .join("Logs")
            .join(config::logging::LOG_DIR_NAME)
    } else {
        // Windows: %LOCALAPPDATA%\WindowCloak\logs, Linux: ~/.local/share/WindowCloak/logs
        dirs::data_local_dir()
            .context("Failed to get local data directory")?
            .join(config::logging::LOG_DIR_NAME)
            .join("logs")
    };

    // Create directory if it doesn't exist
    if !logs_dir.exists() {
        fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;
    }

    Ok(logs_dir)
}

/// Filter for the binary and library crates at `log_level`
fn level_filter(log_level: LogLevel) -> Result<EnvFilter> {
    let level: Option<Level> = log_level.into();
    let Some(lvl) = level else {
        return Ok(EnvFilter::new("off"));
    };
    let directive = format!("windowcloak_capture={}", lvl.as_str())
        .parse()
        .context("Invalid log directive")?;
    Ok(EnvFilter::new(format!("windowcloak={}", lvl.as_str())).add_directive(directive))
}

/// Initialize the logging system
///
/// # Arguments
/// * `log_level` - The minimum log level to record
/// * `log_to_file` - Whether to write logs to file
///
/// # Returns
/// * `Ok(())` if logging was initialized successfully
/// * `Err(anyhow::Error)` if initialization failed
pub fn init_logging(log_level: LogLevel, log_to_file: bool) -> Result<()> {
    let filter = level_filter(log_level)?;

    // Check if logging is already initialized
    let mut handle_guard = LOG_RELOAD_HANDLE.lock().unwrap();
    if let Some(handle) = handle_guard.as_ref() {
        // Logging already initialized, just reload the filter
        handle.reload(filter).context("Failed to reload log filter")?;
        return Ok(());
    }

    // First time initialization
    let (filter_layer, reload_handle) = tracing_subscriber::reload::Layer::new(filter);

    // Standard stderr layer; stdout carries command output
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // File logging is decided once at startup; later calls only reload the level.
    if log_to_file {
        let logs_dir = get_logs_dir()?;
        let appender =
            RollingFileAppender::new(Rotation::DAILY, &logs_dir, config::logging::LOG_FILE_PREFIX);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(appender)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to install log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    *handle_guard = Some(reload_handle);
    Ok(())
}

/// Clean up old log files
///
/// # Arguments
/// * `logs_dir` - Directory containing log files
/// * `keep_days` - Number of days to keep (files older than this will be deleted)
///
/// # Returns
/// * Number of files deleted
pub fn cleanup_old_logs(logs_dir: &Path, keep_days: u32) -> Result<usize> {
    let now = std::time::SystemTime::now();
    let keep_duration = std::time::Duration::from_secs(keep_days as u64 * 24 * 60 * 60);

    let mut deleted_count = 0;

    for entry in fs::read_dir(logs_dir)
        .with_context(|| format!("Failed to read logs directory: {:?}", logs_dir))?
    {
        let entry = entry?;
        let path = entry.path();

        // Only process log files, including rotated ones (windowcloak.log.2026-01-31)
        let is_log = path
            .file_name()
            .and_then(|s| s.to_str())
            .map_or(false, |name| {
                name.starts_with(config::logging::LOG_FILE_PREFIX) || name.ends_with(".log")
            });
        if !path.is_file() || !is_log {
            continue;
        }

        // Get file metadata
        let metadata = entry.metadata()?;
        if let Ok(modified) = metadata.modified() {
            if let Ok(age) = now.duration_since(modified) {
                if age > keep_duration {
                    // File is older than keep_days, delete it
                    if fs::remove_file(&path).is_ok() {
                        deleted_count += 1;
                        tracing::debug!(file = ?path, age_days = age.as_secs() / 86400, "Deleted old log file");
                    }
                }
            }
        }
    }

    Ok(deleted_count)
}

/// Auto-cleanup old logs on startup (runs in background)
pub fn auto_cleanup_old_logs(keep_days: u32) {
    std::thread::spawn(move || {
        if let Ok(logs_dir) = get_logs_dir() {
            match cleanup_old_logs(&logs_dir, keep_days) {
                Ok(count) if count > 0 => {
                    tracing::info!(deleted_count = count, "Cleaned up old log files");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to cleanup old log files");
                }
                _ => {}
            }
        }
    });
}
