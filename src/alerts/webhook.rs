use crate::alerts::sink::{NotificationSink, SendFuture};
use crate::config::SlackConfig;
use crate::error::SinkError;
use crate::events::{ErrorLevel, ErrorRecord};
use chrono::Utc;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Longest message excerpt shown in the attachment title
const TITLE_MESSAGE_LIMIT: usize = 100;

/// Sends alerts to a Slack-compatible incoming webhook
///
/// The payload carries the target channel, a display username, a one-line
/// alert and an attachment with the record's fields. Any non-2xx response or
/// transport error counts as a failed delivery.
pub struct WebhookSink {
    client: Client,
    webhook_url: String,
    channel: String,
    username: String,
}

impl WebhookSink {
    /// Create a webhook sink
    ///
    /// # Arguments
    ///
    /// * `settings` - Webhook URL, channel and username
    /// * `timeout` - Upper bound for the whole HTTP exchange
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Configuration` when the URL is missing and
    /// `SinkError::HttpError` if the HTTP client cannot be built.
    pub fn new(settings: &SlackConfig, timeout: Duration) -> Result<Self, SinkError> {
        let missing = settings.missing_fields();
        if !missing.is_empty() {
            return Err(SinkError::Configuration(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            webhook_url: settings.webhook_url.trim().to_string(),
            channel: settings.channel.clone(),
            username: settings.username.clone(),
        })
    }

    /// Emoji and attachment colour for a level
    fn level_style(level: ErrorLevel) -> (&'static str, &'static str) {
        match level {
            ErrorLevel::Critical => ("\u{1F525}", "danger"),
            ErrorLevel::Error => ("\u{1F6A8}", "danger"),
            ErrorLevel::Fatal => ("\u{1F480}", "danger"),
            ErrorLevel::Exception | ErrorLevel::Warning | ErrorLevel::Warn => {
                ("\u{26A0}\u{FE0F}", "warning")
            }
            ErrorLevel::Fail | ErrorLevel::Unknown => ("\u{1F4E2}", "good"),
        }
    }

    /// Truncate to `max_chars` characters, marking the cut with "..."
    fn truncate_text(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        }
    }

    /// Build the JSON payload for a record
    ///
    /// # Arguments
    ///
    /// * `record` - The detected error
    /// * `sent_at` - Unix timestamp placed in the attachment's `ts` field
    pub fn build_payload(&self, record: &ErrorRecord, sent_at: i64) -> Value {
        let (emoji, color) = Self::level_style(record.level);

        let mut fields = vec![
            json!({ "title": "Timestamp", "value": record.timestamp, "short": true }),
            json!({ "title": "Level", "value": record.level.as_str(), "short": true }),
            json!({ "title": "Matched Keyword", "value": record.matched_keyword, "short": true }),
            json!({ "title": "Detection Time", "value": record.detected_at_iso(), "short": true }),
            json!({
                "title": "Error Message",
                "value": format!("```{}```", record.message),
                "short": false
            }),
        ];
        if record.raw_line != record.message {
            fields.push(json!({
                "title": "Full Log Line",
                "value": format!("```{}```", record.raw_line),
                "short": false
            }));
        }

        json!({
            "channel": self.channel,
            "username": self.username,
            "icon_emoji": ":warning:",
            "text": format!("{} *Log Monitor Alert*: {} detected", emoji, record.level),
            "attachments": [{
                "color": color,
                "title": format!(
                    "{}: {}",
                    record.level,
                    Self::truncate_text(&record.message, TITLE_MESSAGE_LIMIT)
                ),
                "fields": fields,
                "footer": "Log Monitor",
                "ts": sent_at,
            }]
        })
    }
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "slack"
    }

    fn send<'a>(&'a self, record: &'a ErrorRecord) -> SendFuture<'a> {
        Box::pin(async move {
            let payload = self.build_payload(record, Utc::now().timestamp());
            debug!("Posting webhook payload to channel {}", self.channel);

            let response = self
                .client
                .post(&self.webhook_url)
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!("Webhook returned HTTP {}: {}", status, body);
                return Err(SinkError::HttpStatus(status.as_u16()));
            }
            Ok(())
        })
    }
}
