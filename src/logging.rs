//! Log subscriber setup.
//!
//! Foreground runs log to stdout. A detached server, or one given a log
//! file, appends to a file instead. The file writer is synchronous: it owns
//! no background thread, so it keeps working across the detach fork.

use crate::config::{Config, ConfigError, LogTarget};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber for `config`.
pub fn init(config: &Config) -> Result<(), ConfigError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_target() {
        LogTarget::Stdout => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
        }
        LogTarget::File(path) => {
            let appender = file_appender(&path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(appender)
                .init();
        }
    }
    Ok(())
}

/// Appending, never-rotated writer for `path`.
pub fn file_appender(path: &Path) -> Result<RollingFileAppender, ConfigError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ConfigError::Invalid(format!("log file '{}' has no file name", path.display()))
        })?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| ConfigError::LogFile(path.to_path_buf(), e))
}
