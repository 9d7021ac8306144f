//! Best-effort parsing of unstructured log lines into [`ErrorRecord`]s
//!
//! The extractor never fails: anything it cannot recognise is filled in from
//! the detection time or the line itself.

use crate::events::{ErrorLevel, ErrorRecord, Timestamp, TIMESTAMP_FORMAT};
use chrono::{Local, NaiveDateTime};
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

/// Timestamp layouts tried in order; capture group 1 holds the timestamp
const TIMESTAMP_PATTERNS: &[&str] = &[
    r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})",
    r"\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\]",
];

/// Level tokens tried in order, severe before warnings
const LEVEL_PATTERNS: &[&str] = &[
    r"(?i)\b(ERROR|CRITICAL|FATAL|EXCEPTION|FAIL)\b",
    r"(?i)\b(WARN|WARNING)\b",
];

struct CompiledPatterns {
    timestamps: Vec<Regex>,
    levels: Vec<Regex>,
}

fn compiled() -> &'static CompiledPatterns {
    static PATTERNS: OnceLock<CompiledPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CompiledPatterns {
        timestamps: TIMESTAMP_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect(),
        levels: LEVEL_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect(),
    })
}

/// Builds structured error records from matched log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorExtractor;

impl ErrorExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract an error record using the current wall-clock time
    pub fn extract(&self, line: &str, matched_keyword: &str) -> ErrorRecord {
        self.extract_at(line, matched_keyword, Local::now())
    }

    /// Extract an error record as if detected at `now`
    pub fn extract_at(&self, line: &str, matched_keyword: &str, now: Timestamp) -> ErrorRecord {
        let raw_line = line.trim();

        let timestamp = Self::extract_timestamp(raw_line)
            .unwrap_or_else(|| now.format(TIMESTAMP_FORMAT).to_string());
        let level = Self::extract_level(raw_line);
        let message = Self::extract_message(raw_line, level);

        debug!(
            "Extracted record: timestamp={}, level={}, keyword={}",
            timestamp, level, matched_keyword
        );

        ErrorRecord {
            timestamp,
            level,
            message,
            raw_line: raw_line.to_string(),
            matched_keyword: matched_keyword.to_string(),
            detected_at: now,
        }
    }

    /// First recognised timestamp that is also a real calendar date
    fn extract_timestamp(line: &str) -> Option<String> {
        compiled().timestamps.iter().find_map(|pattern| {
            let candidate = pattern.captures(line)?.get(1)?.as_str();
            NaiveDateTime::parse_from_str(candidate, TIMESTAMP_FORMAT)
                .ok()
                .map(|_| candidate.to_string())
        })
    }

    fn extract_level(line: &str) -> ErrorLevel {
        compiled()
            .levels
            .iter()
            .find_map(|pattern| {
                let token = pattern.captures(line)?.get(1)?.as_str();
                ErrorLevel::from_token(token)
            })
            .unwrap_or(ErrorLevel::Unknown)
    }

    /// Text after the first literal occurrence of the level token
    ///
    /// Leading punctuation and trailing colons are stripped. Falls back to the
    /// whole line when the uppercase token is not present verbatim or nothing
    /// follows it, so alerts never carry an empty message.
    fn extract_message(line: &str, level: ErrorLevel) -> String {
        if level == ErrorLevel::Unknown {
            return line.to_string();
        }

        let token = level.as_str();
        match line.find(token) {
            Some(start) => {
                let rest = line[start + token.len()..]
                    .trim_start_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
                    .trim_end()
                    .trim_end_matches(':')
                    .trim_end();
                if rest.is_empty() {
                    line.to_string()
                } else {
                    rest.to_string()
                }
            }
            None => line.to_string(),
        }
    }
}
