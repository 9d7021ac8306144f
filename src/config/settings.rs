use crate::error::ConfigError;
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Prefix of the sample webhook URL shipped in example configs
const PLACEHOLDER_WEBHOOK_PREFIX: &str = "https://hooks.slack.com/services/YOUR";

/// Upper bound for per-sink delivery timeouts
const MAX_SEND_TIMEOUT_SECONDS: u64 = 60;

/// Starter configuration written when the configured file does not exist
///
/// Parses to [`Config::default`]; the sink sections stay commented out until
/// filled in.
pub const CONFIG_TEMPLATE: &str = r##"# logwatch-alert configuration

[general]
# Log file to monitor, relative to the working directory or absolute
log_file_path = "sample.log"

# Keywords in priority order; the first one found in a line is reported
error_keywords = ["ERROR", "CRITICAL", "EXCEPTION", "FATAL"]

# Minimum seconds between two alerts
rate_limit_seconds = 300

heartbeat_seconds = 60
send_timeout_seconds = 10
shutdown_grace_seconds = 5

# [email]
# smtp_server = "smtp.gmail.com"
# smtp_port = 587
# sender_email = "your.email@gmail.com"
# sender_password = "your_app_password_here"
# sender_name = "Log Monitor"
# recipient_emails = ["admin@yourcompany.com", "devteam@yourcompany.com"]

# [slack]
# webhook_url = "https://hooks.slack.com/services/YOUR/SLACK/WEBHOOK"
# channel = "#alerts"
# username = "Log Monitor"
"##;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Log file, keywords and timing
    pub general: GeneralConfig,
    /// Email sink; absent means disabled
    pub email: Option<EmailConfig>,
    /// Chat webhook sink; absent means disabled
    pub slack: Option<SlackConfig>,
}

/// Monitoring settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log file to monitor, relative paths resolve against the working directory
    pub log_file_path: PathBuf,
    /// Error keywords in priority order; a comma-separated string is accepted
    #[serde(deserialize_with = "string_or_list")]
    pub error_keywords: Vec<String>,
    /// Minimum seconds between notifications
    pub rate_limit_seconds: u64,
    /// Seconds between liveness reports
    pub heartbeat_seconds: u64,
    /// Seconds before an individual sink delivery is abandoned
    pub send_timeout_seconds: u64,
    /// Seconds in-flight deliveries get to finish on shutdown
    pub shutdown_grace_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_file_path: PathBuf::from("sample.log"),
            error_keywords: ["ERROR", "CRITICAL", "EXCEPTION", "FATAL"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            rate_limit_seconds: 300,
            heartbeat_seconds: 60,
            send_timeout_seconds: 10,
            shutdown_grace_seconds: 5,
        }
    }
}

/// SMTP email sink settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub sender_password: String,
    pub sender_name: String,
    /// Recipients; a comma-separated string is accepted
    #[serde(deserialize_with = "string_or_list")]
    pub recipient_emails: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender_email: String::new(),
            sender_password: String::new(),
            sender_name: "Log Monitor".to_string(),
            recipient_emails: Vec::new(),
        }
    }
}

impl EmailConfig {
    /// Required fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.smtp_server.trim().is_empty() {
            missing.push("smtp_server");
        }
        if self.sender_email.trim().is_empty() {
            missing.push("sender_email");
        }
        if self.sender_password.is_empty() {
            missing.push("sender_password");
        }
        if self.recipients().is_empty() {
            missing.push("recipient_emails");
        }
        missing
    }

    /// Recipient addresses with blanks removed
    pub fn recipients(&self) -> Vec<&str> {
        self.recipient_emails
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect()
    }
}

/// Slack-compatible webhook sink settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlackConfig {
    pub enabled: bool,
    pub webhook_url: String,
    pub channel: String,
    pub username: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: String::new(),
            channel: "#alerts".to_string(),
            username: "Log Monitor".to_string(),
        }
    }
}

impl SlackConfig {
    /// Required fields that are empty or still hold the sample value
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let url = self.webhook_url.trim();
        if url.is_empty() || url.starts_with(PLACEHOLDER_WEBHOOK_PREFIX) {
            vec!["webhook_url"]
        } else {
            Vec::new()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(joined) => joined.split(',').map(str::to_string).collect(),
        StringOrList::Many(items) => items,
    })
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read and a parse
    /// or validation error if its contents are invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, falling back to defaults when the file is missing
    ///
    /// A missing file is replaced by [`CONFIG_TEMPLATE`] so there is something
    /// to edit; failing to write it only costs a warning. A file that exists
    /// but cannot be parsed or validated is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from: {}", path.display());
                Self::from_file(path)
            }
            Some(path) => {
                warn!(
                    "Configuration file '{}' not found, using defaults",
                    path.display()
                );
                match Self::write_template(path) {
                    Ok(()) => info!(
                        "Default configuration written to {}, edit it to enable notifications",
                        path.display()
                    ),
                    Err(e) => warn!("Could not write default configuration: {}", e),
                }
                Ok(Self::default())
            }
            None => {
                info!("Using default configuration");
                Ok(Self::default())
            }
        }
    }

    /// Write [`CONFIG_TEMPLATE`] to `path`, refusing to overwrite an existing file
    pub fn write_template(path: &Path) -> Result<(), ConfigError> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        file.write_all(CONFIG_TEMPLATE.as_bytes())
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
    }

    /// Check values the monitor cannot run without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.log_file_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "general.log_file_path must not be empty".to_string(),
            ));
        }
        if self.keywords().is_empty() {
            return Err(ConfigError::ValidationError(
                "general.error_keywords must contain at least one keyword".to_string(),
            ));
        }
        if !(1..=MAX_SEND_TIMEOUT_SECONDS).contains(&self.general.send_timeout_seconds) {
            return Err(ConfigError::ValidationError(format!(
                "general.send_timeout_seconds must be between 1 and {}",
                MAX_SEND_TIMEOUT_SECONDS
            )));
        }
        if self.general.heartbeat_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "general.heartbeat_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Error keywords trimmed, with empty entries removed
    pub fn keywords(&self) -> Vec<String> {
        self.general
            .error_keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Absolute path of the monitored log file
    pub fn log_file_path(&self) -> PathBuf {
        let path = &self.general.log_file_path;
        if path.is_absolute() {
            return path.clone();
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.clone(),
        }
    }
}
