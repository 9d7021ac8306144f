use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while tailing or watching the log file
#[derive(Error, Debug)]
pub enum TailerError {
    #[error("Permission denied: cannot read log file {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Failed to prepare log file {}: {source}", .path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur when a sink delivers a notification
///
/// These never escape the dispatcher; they are folded into per-sink results.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink misconfigured: {0}")]
    Configuration(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SMTP error: {0}")]
    SmtpError(#[from] lettre::transport::smtp::Error),

    #[error("Failed to build email: {0}")]
    MessageError(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    AddressError(#[from] lettre::address::AddressError),

    #[error("Failed to send notification: {0}")]
    NotificationFailed(String),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("Invalid error keyword pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors that stop the monitor from starting
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tailer(#[from] TailerError),

    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Monitor is already running")]
    AlreadyRunning,
}
