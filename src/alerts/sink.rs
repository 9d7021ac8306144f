use crate::error::SinkError;
use crate::events::ErrorRecord;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Boxed future returned by [`NotificationSink::send`]
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;

/// A notification delivery target
///
/// Implementations must turn every transport problem (timeouts, auth
/// failures, unexpected responses) into an `Err` rather than panicking; the
/// dispatcher records it as a failed delivery for this sink only.
pub trait NotificationSink: Send + Sync {
    /// Short, stable name used as the key in dispatch results
    fn name(&self) -> &str;

    /// Deliver one error record
    fn send<'a>(&'a self, record: &'a ErrorRecord) -> SendFuture<'a>;
}

/// Mock sink for testing
///
/// Succeeds or fails on demand, optionally after a delay, and remembers how
/// often it was called and with which record.
pub struct MockSink {
    name: String,
    fail_with: Option<String>,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    last_record: Mutex<Option<ErrorRecord>>,
}

impl MockSink {
    /// Create a mock sink that always delivers successfully
    pub fn success(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_with: None,
            delay: None,
            call_count: AtomicUsize::new(0),
            last_record: Mutex::new(None),
        }
    }

    /// Create a mock sink that always fails with the given message
    pub fn failing(name: &str, error_message: &str) -> Self {
        Self {
            fail_with: Some(error_message.to_string()),
            ..Self::success(name)
        }
    }

    /// Add a delay to every delivery (useful for testing timeouts)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times send() has been called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The last record passed to send()
    pub fn last_record(&self) -> Option<ErrorRecord> {
        self.last_record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationSink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send<'a>(&'a self, record: &'a ErrorRecord) -> SendFuture<'a> {
        Box::pin(async move {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            *self
                .last_record
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(record.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match &self.fail_with {
                Some(message) => Err(SinkError::NotificationFailed(message.clone())),
                None => Ok(()),
            }
        })
    }
}
