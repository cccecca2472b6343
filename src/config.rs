//! Configuration module for the framelog server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "framelog")]
#[command(author = "framelog authors")]
#[command(version = "0.1.0")]
#[command(about = "A TCP server that logs newline-delimited frames and replays the log", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:9000)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Run in the background, detached from the controlling terminal
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Pending connection backlog passed to listen(2)
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Path of the append-only data file
    #[arg(short = 'f', long)]
    pub data_file: Option<PathBuf>,

    /// Initial receive buffer size in bytes
    #[arg(long)]
    pub initial_buffer_size: Option<usize>,

    /// What to do when a single session fails
    #[arg(long, value_enum)]
    pub session_failures: Option<SessionFailurePolicy>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Write logs to this file instead of stdout
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// How a failure inside one session affects the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SessionFailurePolicy {
    /// Log the failure, drop that connection and keep serving.
    #[default]
    Isolate,
    /// Terminate the process with the failure's exit status.
    Exit,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// listen(2) backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Detach from the controlling terminal after binding
    #[serde(default)]
    pub daemon: bool,
    #[serde(default)]
    pub session_failures: SessionFailurePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            daemon: false,
            session_failures: SessionFailurePolicy::default(),
        }
    }
}

/// Storage-related configuration
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Append-only data file
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// Initial receive buffer size in bytes
    #[serde(default = "default_initial_buffer_size")]
    pub initial_buffer_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            initial_buffer_size: default_initial_buffer_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file; defaults to `default_daemon_log_file()` in daemon mode
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_backlog() -> i32 {
    10
}

fn default_data_file() -> PathBuf {
    PathBuf::from("/var/tmp/aesdsocketdata")
}

fn default_initial_buffer_size() -> usize {
    512
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where a detached server logs when no file is configured.
pub fn default_daemon_log_file() -> PathBuf {
    PathBuf::from("/var/tmp/framelog.log")
}

/// Destination for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    File(PathBuf),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub backlog: i32,
    pub daemon: bool,
    pub session_failures: SessionFailurePolicy,
    pub data_file: PathBuf,
    pub initial_buffer_size: usize,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve an already-parsed command line against its TOML file, if any.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            daemon: cli.daemon || toml_config.server.daemon,
            session_failures: cli
                .session_failures
                .unwrap_or(toml_config.server.session_failures),
            data_file: cli.data_file.unwrap_or(toml_config.storage.data_file),
            initial_buffer_size: cli
                .initial_buffer_size
                .unwrap_or(toml_config.storage.initial_buffer_size),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
            log_file: cli.log_file.or(toml_config.logging.file),
        };
        config.validate()?;
        Ok(config)
    }

    /// Log destination. A detached server has no terminal, so it always
    /// logs to a file.
    pub fn log_target(&self) -> LogTarget {
        match (&self.log_file, self.daemon) {
            (Some(path), _) => LogTarget::File(path.clone()),
            (None, true) => LogTarget::File(default_daemon_log_file()),
            (None, false) => LogTarget::Stdout,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog <= 0 {
            return Err(ConfigError::Invalid(format!(
                "backlog must be positive, got {}",
                self.backlog
            )));
        }
        if self.initial_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "initial_buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to open log file '{}': {}", .0.display(), .1)]
    LogFile(PathBuf, #[source] tracing_appender::rolling::InitError),
}
