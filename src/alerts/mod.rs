/// Notification delivery and rate limiting
pub mod dispatcher;
pub mod email;
pub mod rate_limiter;
pub mod sink;
pub mod webhook;

pub use dispatcher::{DispatchResult, NotificationDispatcher, SinkResult};
pub use email::EmailSink;
pub use rate_limiter::RateLimiter;
pub use sink::{MockSink, NotificationSink, SendFuture};
pub use webhook::WebhookSink;
