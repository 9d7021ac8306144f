/// Error types for the log monitor
pub mod error;

/// Error records and levels
pub mod events;

/// Keyword matching and record extraction
pub mod detection;

/// Log file tailing and change notifications
pub mod collectors;

/// Rate limiting and notification sinks
pub mod alerts;

/// Configuration management
pub mod config;

/// Self-monitoring counters
pub mod monitoring;

/// Pipeline orchestration and run loop
pub mod monitor;

// Re-export commonly used types
pub use error::{ConfigError, MonitorError, SinkError, TailerError};
pub use events::{ErrorLevel, ErrorRecord};
pub use monitor::{AlertPipeline, LineOutcome, LogMonitor};
