use crate::alerts::sink::{NotificationSink, SendFuture};
use crate::config::EmailConfig;
use crate::error::SinkError;
use crate::events::{ErrorLevel, ErrorRecord};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::debug;
use std::time::Duration;

/// Sends alerts by email through an authenticated STARTTLS SMTP relay
///
/// Every alert is a multipart/alternative message with a plain text and an
/// HTML rendering of the record, addressed to all configured recipients.
pub struct EmailSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailSink {
    /// Create an email sink
    ///
    /// # Arguments
    ///
    /// * `settings` - SMTP server, credentials and addresses
    /// * `timeout` - Upper bound for each SMTP command
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Configuration` for missing fields and
    /// `SinkError::AddressError` for addresses that do not parse.
    pub fn new(settings: &EmailConfig, timeout: Duration) -> Result<Self, SinkError> {
        let missing = settings.missing_fields();
        if !missing.is_empty() {
            return Err(SinkError::Configuration(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let from = Mailbox::new(
            Some(settings.sender_name.clone()),
            settings.sender_email.trim().parse()?,
        );
        let to = settings
            .recipients()
            .into_iter()
            .map(str::parse::<Mailbox>)
            .collect::<Result<Vec<_>, _>>()?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(
            settings.smtp_server.trim(),
        )?
        .port(settings.smtp_port)
        .credentials(Credentials::new(
            settings.sender_email.trim().to_string(),
            settings.sender_password.clone(),
        ))
        .timeout(Some(timeout))
        .build();

        Ok(Self { transport, from, to })
    }

    /// Subject line for a record
    pub fn subject(record: &ErrorRecord) -> String {
        format!("Log Alert: {} Detected", record.level)
    }

    /// Compose the full message for a record
    pub fn build_message(&self, record: &ErrorRecord) -> Result<Message, SinkError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(Self::subject(record));
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        let message = builder.multipart(MultiPart::alternative_plain_html(
            Self::text_body(record),
            Self::html_body(record),
        ))?;
        Ok(message)
    }

    fn text_body(record: &ErrorRecord) -> String {
        format!(
            "LOG MONITOR ALERT\n\
             =================\n\
             \n\
             An error has been detected in your application logs:\n\
             \n\
             Timestamp: {}\n\
             Level: {}\n\
             Message: {}\n\
             Matched Keyword: {}\n\
             \n\
             Full Log Line:\n\
             {}\n\
             \n\
             Detection Details:\n\
             - Detected at: {}\n\
             \n\
             This is an automated alert. Please investigate the issue promptly.",
            record.timestamp,
            record.level,
            record.message,
            record.matched_keyword,
            record.raw_line,
            record.detected_at_iso(),
        )
    }

    fn level_color(level: ErrorLevel) -> &'static str {
        match level {
            ErrorLevel::Critical | ErrorLevel::Fatal => "#dc3545",
            ErrorLevel::Error | ErrorLevel::Exception => "#fd7e14",
            ErrorLevel::Warning | ErrorLevel::Warn => "#ffc107",
            ErrorLevel::Fail | ErrorLevel::Unknown => "#6c757d",
        }
    }

    fn escape_html(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&#39;"),
                _ => escaped.push(c),
            }
        }
        escaped
    }

    fn html_body(record: &ErrorRecord) -> String {
        let color = Self::level_color(record.level);
        let row = |label: &str, value: &str| {
            format!(
                "<tr><td style=\"padding: 8px; font-weight: bold; width: 150px;\">{}</td>\
                 <td style=\"padding: 8px;\">{}</td></tr>",
                label,
                Self::escape_html(value)
            )
        };

        format!(
            "<!DOCTYPE html>\n\
             <html>\n\
             <head><meta charset=\"utf-8\"><title>Log Monitor Alert</title></head>\n\
             <body style=\"font-family: Arial, sans-serif; line-height: 1.6; color: #333;\">\n\
             <div style=\"max-width: 600px; margin: 0 auto; padding: 20px;\">\n\
             <div style=\"background-color: {color}; color: white; padding: 15px; border-radius: 5px;\">\n\
             <h2 style=\"margin: 0;\">Log Monitor Alert</h2>\n\
             <p style=\"margin: 5px 0 0 0;\">Error Level: <strong>{level}</strong></p>\n\
             </div>\n\
             <h3>Error Details</h3>\n\
             <table style=\"width: 100%; border-collapse: collapse;\">\n\
             {timestamp}\n{level_row}\n{message}\n{keyword}\n\
             </table>\n\
             <h4>Full Log Line:</h4>\n\
             <code style=\"display: block; padding: 10px; font-size: 12px;\">{raw_line}</code>\n\
             <p style=\"font-size: 12px; color: #6c757d;\">Detected at: {detected_at}</p>\n\
             </div>\n\
             </body>\n\
             </html>\n",
            color = color,
            level = record.level,
            timestamp = row("Timestamp:", &record.timestamp),
            level_row = row("Level:", record.level.as_str()),
            message = row("Message:", &record.message),
            keyword = row("Keyword:", &record.matched_keyword),
            raw_line = Self::escape_html(&record.raw_line),
            detected_at = record.detected_at_iso(),
        )
    }
}

impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    fn send<'a>(&'a self, record: &'a ErrorRecord) -> SendFuture<'a> {
        Box::pin(async move {
            let message = self.build_message(record)?;
            debug!("Sending alert email to {} recipients", self.to.len());
            self.transport.send(message).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn settings() -> EmailConfig {
        EmailConfig {
            smtp_server: "127.0.0.1".to_string(),
            smtp_port: 2525,
            sender_email: "alerts@example.com".to_string(),
            sender_password: "secret".to_string(),
            sender_name: "Log Monitor".to_string(),
            recipient_emails: vec!["ops@example.com".to_string(), "dev@example.com".to_string()],
            ..EmailConfig::default()
        }
    }

    fn record() -> ErrorRecord {
        ErrorRecord {
            timestamp: "2024-01-15 14:30:25".to_string(),
            level: ErrorLevel::Critical,
            message: "Disk <sda> full".to_string(),
            raw_line: "2024-01-15 14:30:25 CRITICAL Disk <sda> full".to_string(),
            matched_keyword: "CRITICAL".to_string(),
            detected_at: Local::now(),
        }
    }

    #[test]
    fn test_missing_fields_are_configuration_error() {
        let incomplete = EmailConfig {
            recipient_emails: Vec::new(),
            ..settings()
        };
        assert!(matches!(
            EmailSink::new(&incomplete, Duration::from_secs(1)),
            Err(SinkError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_recipient_is_address_error() {
        let bad = EmailConfig {
            recipient_emails: vec!["not an address".to_string()],
            ..settings()
        };
        assert!(matches!(
            EmailSink::new(&bad, Duration::from_secs(1)),
            Err(SinkError::AddressError(_))
        ));
    }

    #[test]
    fn test_subject() {
        assert_eq!(EmailSink::subject(&record()), "Log Alert: CRITICAL Detected");
    }

    #[test]
    fn test_message_headers_and_bodies() {
        let sink = EmailSink::new(&settings(), Duration::from_secs(1)).unwrap();
        let formatted = String::from_utf8(sink.build_message(&record()).unwrap().formatted()).unwrap();

        assert!(formatted.contains("Subject: Log Alert: CRITICAL Detected"));
        assert!(formatted.contains("ops@example.com"));
        assert!(formatted.contains("dev@example.com"));
        assert!(formatted.contains("multipart/alternative"));
        assert!(formatted.contains("text/plain"));
        assert!(formatted.contains("text/html"));
    }

    #[test]
    fn test_text_body_fields() {
        let body = EmailSink::text_body(&record());
        assert!(body.contains("Timestamp: 2024-01-15 14:30:25"));
        assert!(body.contains("Level: CRITICAL"));
        assert!(body.contains("Message: Disk <sda> full"));
        assert!(body.contains("Matched Keyword: CRITICAL"));
        assert!(body.contains("2024-01-15 14:30:25 CRITICAL Disk <sda> full"));
    }

    #[test]
    fn test_html_body_escapes_log_text() {
        let html = EmailSink::html_body(&record());
        assert!(html.contains("Disk &lt;sda&gt; full"));
        assert!(!html.contains("<sda>"));
        assert!(html.contains("#dc3545"));
    }

    #[tokio::test]
    async fn test_send_to_unreachable_server_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let unreachable = EmailConfig {
            smtp_port: port,
            ..settings()
        };
        let sink = EmailSink::new(&unreachable, Duration::from_secs(2)).unwrap();
        assert!(sink.send(&record()).await.is_err());
    }
}
