//! Core record types shared by the detection and alerting stages
//!
//! An [`ErrorRecord`] is built once per matching log line and handed to the
//! dispatcher; nothing in the crate mutates it afterwards.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format used for record timestamps, both extracted and synthesized
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wall-clock instant type used for detection times
pub type Timestamp = DateTime<Local>;

/// Severity token recognised in a log line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorLevel {
    Error,
    Critical,
    Fatal,
    Exception,
    Fail,
    Warn,
    Warning,
    /// No level token found in the line
    Unknown,
}

impl ErrorLevel {
    /// Parse a level token, ignoring case
    ///
    /// Returns `None` for anything outside the known set; callers map that to
    /// [`ErrorLevel::Unknown`].
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "ERROR" => Some(Self::Error),
            "CRITICAL" => Some(Self::Critical),
            "FATAL" => Some(Self::Fatal),
            "EXCEPTION" => Some(Self::Exception),
            "FAIL" => Some(Self::Fail),
            "WARN" => Some(Self::Warn),
            "WARNING" => Some(Self::Warning),
            _ => None,
        }
    }

    /// Uppercase token as it appears in alerts
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Fatal => "FATAL",
            Self::Exception => "EXCEPTION",
            Self::Fail => "FAIL",
            Self::Warn => "WARN",
            Self::Warning => "WARNING",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured view of a log line that matched an error keyword
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    /// Timestamp from the line, or the detection time, as `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    /// Level token found in the line
    pub level: ErrorLevel,
    /// Text following the level token, or the whole line
    pub message: String,
    /// The full original line, trimmed; never empty
    pub raw_line: String,
    /// Keyword whose pattern matched first
    pub matched_keyword: String,
    /// When the line was detected
    pub detected_at: Timestamp,
}

impl ErrorRecord {
    /// Detection instant in ISO-8601 form
    pub fn detected_at_iso(&self) -> String {
        self.detected_at.to_rfc3339()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn sample_record() -> ErrorRecord {
        ErrorRecord {
            timestamp: "2024-01-15 14:30:25".to_string(),
            level: ErrorLevel::Error,
            message: "Database connection failed".to_string(),
            raw_line: "2024-01-15 14:30:25 ERROR: Database connection failed".to_string(),
            matched_keyword: "ERROR".to_string(),
            detected_at: Local::now(),
        }
    }

    #[test]
    fn test_level_from_token_is_case_insensitive() {
        assert_eq!(ErrorLevel::from_token("error"), Some(ErrorLevel::Error));
        assert_eq!(ErrorLevel::from_token("Critical"), Some(ErrorLevel::Critical));
        assert_eq!(ErrorLevel::from_token("WARNING"), Some(ErrorLevel::Warning));
        assert_eq!(ErrorLevel::from_token("warn"), Some(ErrorLevel::Warn));
        assert_eq!(ErrorLevel::from_token("notice"), None);
    }

    #[test]
    fn test_level_display_matches_token() {
        for level in [
            ErrorLevel::Error,
            ErrorLevel::Critical,
            ErrorLevel::Fatal,
            ErrorLevel::Exception,
            ErrorLevel::Fail,
            ErrorLevel::Warn,
            ErrorLevel::Warning,
        ] {
            assert_eq!(ErrorLevel::from_token(&level.to_string()), Some(level));
        }
        assert_eq!(ErrorLevel::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn test_level_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorLevel::Critical).unwrap(),
            "\"CRITICAL\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorLevel::Unknown).unwrap(),
            "\"UNKNOWN\""
        );
    }

    #[test]
    fn test_record_timestamp_parses_back() {
        let record = sample_record();
        assert!(NaiveDateTime::parse_from_str(&record.timestamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_detected_at_iso_is_rfc3339() {
        let record = sample_record();
        let iso = record.detected_at_iso();
        assert!(DateTime::parse_from_rfc3339(&iso).is_ok());
    }
}
