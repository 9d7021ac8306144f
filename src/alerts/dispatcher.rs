use crate::alerts::email::EmailSink;
use crate::alerts::sink::NotificationSink;
use crate::alerts::webhook::WebhookSink;
use crate::config::Config;
use crate::error::SinkError;
use crate::events::ErrorRecord;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound for a single sink delivery
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of delivering one record to one sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkResult {
    /// Sink name
    pub sink: String,
    /// Whether delivery succeeded
    pub success: bool,
    /// Failure detail, if any
    pub error: Option<String>,
}

/// Aggregated outcome of one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    /// Per-sink outcomes in configuration order
    pub results: Vec<SinkResult>,
    /// True if at least one sink delivered
    pub any_succeeded: bool,
    /// True when no sinks are configured at all
    pub degraded: bool,
}

impl DispatchResult {
    fn from_results(results: Vec<SinkResult>) -> Self {
        let any_succeeded = results.iter().any(|r| r.success);
        Self {
            results,
            any_succeeded,
            degraded: false,
        }
    }

    fn degraded() -> Self {
        Self {
            results: Vec::new(),
            any_succeeded: false,
            degraded: true,
        }
    }

    /// Success flag for a named sink
    pub fn succeeded(&self, sink: &str) -> Option<bool> {
        self.results
            .iter()
            .find(|r| r.sink == sink)
            .map(|r| r.success)
    }

    /// Sink name to success flag
    pub fn as_map(&self) -> BTreeMap<String, bool> {
        self.results
            .iter()
            .map(|r| (r.sink.clone(), r.success))
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }
}

/// Fans an error record out to every configured sink
///
/// Sinks are attempted concurrently, one tokio task each, and each delivery
/// is bounded by the send timeout. A failing, slow or panicking sink only
/// affects its own entry in the result; `dispatch` itself never fails.
pub struct NotificationDispatcher {
    sinks: Vec<Arc<dyn NotificationSink>>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self {
            sinks,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Build the dispatcher from configuration
    ///
    /// Sinks whose section is absent or disabled are skipped; sinks with
    /// configuration defects are skipped with a warning. Neither is fatal.
    pub fn from_config(config: &Config) -> Self {
        let send_timeout = Duration::from_secs(config.general.send_timeout_seconds);
        let mut sinks: Vec<Arc<dyn NotificationSink>> = Vec::new();

        if let Some(email) = config.email.as_ref().filter(|e| e.enabled) {
            match EmailSink::new(email, send_timeout) {
                Ok(sink) => {
                    info!(
                        "Email notifications enabled via {}:{}",
                        email.smtp_server, email.smtp_port
                    );
                    sinks.push(Arc::new(sink));
                }
                Err(e) => warn!("Email notifications disabled: {}", e),
            }
        }

        if let Some(slack) = config.slack.as_ref().filter(|s| s.enabled) {
            match WebhookSink::new(slack, send_timeout) {
                Ok(sink) => {
                    info!("Webhook notifications enabled for channel {}", slack.channel);
                    sinks.push(Arc::new(sink));
                }
                Err(e) => warn!("Webhook notifications disabled: {}", e),
            }
        }

        let dispatcher = Self::new(sinks).with_send_timeout(send_timeout);
        if dispatcher.is_degraded() {
            warn!("No notification sinks configured; errors will be detected but not delivered");
        }
        dispatcher
    }

    /// Names of the configured sinks
    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// True when there is nothing to deliver to
    pub fn is_degraded(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver a record to every sink and aggregate the results
    pub async fn dispatch(&self, record: &ErrorRecord) -> DispatchResult {
        if self.sinks.is_empty() {
            warn!(
                "No notification sinks available, {} alert not delivered",
                record.level
            );
            return DispatchResult::degraded();
        }

        let record = Arc::new(record.clone());
        let handles: Vec<_> = self
            .sinks
            .iter()
            .map(|sink| {
                let sink = Arc::clone(sink);
                let record = Arc::clone(&record);
                let send_timeout = self.send_timeout;
                tokio::spawn(async move {
                    match tokio::time::timeout(send_timeout, sink.send(&record)).await {
                        Ok(result) => result,
                        Err(_) => Err(SinkError::Timeout(send_timeout)),
                    }
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (sink, handle) in self.sinks.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("delivery task failed: {}", e)),
            };

            let name = sink.name().to_string();
            match outcome {
                Ok(()) => {
                    info!("Notification sent via {}", name);
                    results.push(SinkResult {
                        sink: name,
                        success: true,
                        error: None,
                    });
                }
                Err(detail) => {
                    warn!("Failed to send notification via {}: {}", name, detail);
                    results.push(SinkResult {
                        sink: name,
                        success: false,
                        error: Some(detail),
                    });
                }
            }
        }

        DispatchResult::from_results(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::sink::{MockSink, SendFuture};
    use crate::config::{EmailConfig, SlackConfig};
    use crate::events::ErrorLevel;
    use chrono::Local;

    fn record() -> ErrorRecord {
        ErrorRecord {
            timestamp: "2024-01-15 14:30:25".to_string(),
            level: ErrorLevel::Error,
            message: "Database connection failed".to_string(),
            raw_line: "2024-01-15 14:30:25 ERROR: Database connection failed".to_string(),
            matched_keyword: "ERROR".to_string(),
            detected_at: Local::now(),
        }
    }

    struct PanickingSink;

    impl NotificationSink for PanickingSink {
        fn name(&self) -> &str {
            "panicky"
        }

        fn send<'a>(&'a self, _record: &'a ErrorRecord) -> SendFuture<'a> {
            Box::pin(async move { panic!("sink exploded") })
        }
    }

    #[tokio::test]
    async fn test_all_sinks_succeed() {
        let a = Arc::new(MockSink::success("a"));
        let b = Arc::new(MockSink::success("b"));
        let dispatcher = NotificationDispatcher::new(vec![a.clone(), b.clone()]);

        let result = dispatcher.dispatch(&record()).await;

        assert!(result.any_succeeded);
        assert!(!result.degraded);
        assert_eq!(result.success_count(), 2);
        assert_eq!(a.call_count(), 1);
        let delivered = b.last_record().unwrap();
        assert_eq!(delivered.message, "Database connection failed");
        assert_eq!(delivered.matched_keyword, "ERROR");
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let failing = Arc::new(MockSink::failing("email", "auth rejected"));
        let working = Arc::new(MockSink::success("slack"));
        let dispatcher = NotificationDispatcher::new(vec![failing.clone(), working.clone()]);

        let result = dispatcher.dispatch(&record()).await;

        assert!(result.any_succeeded);
        assert_eq!(result.succeeded("email"), Some(false));
        assert_eq!(result.succeeded("slack"), Some(true));
        assert_eq!(failing.call_count(), 1);
        assert_eq!(working.call_count(), 1);
        assert!(result.results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("auth rejected"));
    }

    #[tokio::test]
    async fn test_all_sinks_fail() {
        let dispatcher = NotificationDispatcher::new(vec![
            Arc::new(MockSink::failing("a", "down")),
            Arc::new(MockSink::failing("b", "down")),
        ]);

        let result = dispatcher.dispatch(&record()).await;

        assert!(!result.any_succeeded);
        assert_eq!(result.failure_count(), 2);
        assert_eq!(
            result.as_map(),
            BTreeMap::from([("a".to_string(), false), ("b".to_string(), false)])
        );
    }

    #[tokio::test]
    async fn test_no_sinks_is_degraded() {
        let dispatcher = NotificationDispatcher::new(Vec::new());
        assert!(dispatcher.is_degraded());

        let result = dispatcher.dispatch(&record()).await;
        assert!(result.degraded);
        assert!(!result.any_succeeded);
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn test_slow_sink_times_out() {
        let slow = Arc::new(MockSink::success("slow").with_delay(Duration::from_secs(5)));
        let fast = Arc::new(MockSink::success("fast"));
        let dispatcher = NotificationDispatcher::new(vec![slow, fast])
            .with_send_timeout(Duration::from_millis(100));

        let result = dispatcher.dispatch(&record()).await;

        assert_eq!(result.succeeded("slow"), Some(false));
        assert_eq!(result.succeeded("fast"), Some(true));
        assert!(result.results[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_sinks_run_concurrently() {
        let delay = Duration::from_millis(400);
        let dispatcher = NotificationDispatcher::new(vec![
            Arc::new(MockSink::success("a").with_delay(delay)),
            Arc::new(MockSink::success("b").with_delay(delay)),
            Arc::new(MockSink::success("c").with_delay(delay)),
        ]);

        let started = tokio::time::Instant::now();
        let result = dispatcher.dispatch(&record()).await;

        assert_eq!(result.success_count(), 3);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_panicking_sink_is_a_failure() {
        let dispatcher = NotificationDispatcher::new(vec![
            Arc::new(PanickingSink),
            Arc::new(MockSink::success("ok")),
        ]);

        let result = dispatcher.dispatch(&record()).await;

        assert_eq!(result.succeeded("panicky"), Some(false));
        assert_eq!(result.succeeded("ok"), Some(true));
    }

    #[test]
    fn test_from_config_skips_defective_sinks() {
        let config = Config {
            email: Some(EmailConfig::default()),
            slack: Some(SlackConfig::default()),
            ..Config::default()
        };
        let dispatcher = NotificationDispatcher::from_config(&config);
        assert!(dispatcher.is_degraded());
    }

    #[test]
    fn test_from_config_respects_enabled_flag() {
        let slack = SlackConfig {
            webhook_url: "https://hooks.example.com/T/B".to_string(),
            ..SlackConfig::default()
        };
        let enabled = Config {
            slack: Some(slack.clone()),
            ..Config::default()
        };
        let disabled = Config {
            slack: Some(SlackConfig {
                enabled: false,
                ..slack
            }),
            ..Config::default()
        };

        assert_eq!(
            NotificationDispatcher::from_config(&enabled).sink_names(),
            vec!["slack"]
        );
        assert!(NotificationDispatcher::from_config(&disabled).is_degraded());
    }
}
