use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Rate limiter for preventing notification spam
///
/// Enforces a minimum interval between notifications. The limit is global:
/// once a notification goes out, every further error is suppressed until the
/// interval has elapsed, whatever its level or keyword.
///
/// Checking and consuming a permit happen under one lock, so concurrent
/// callers can never both be granted the same window.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between granted permits
    min_interval: Duration,
    /// When the last permit was granted; `None` until the first one
    last_sent_at: Mutex<Option<DateTime<Utc>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(300) // Default: one notification burst every 5 minutes
    }
}

impl RateLimiter {
    /// Create a new rate limiter with the given minimum interval
    ///
    /// # Arguments
    ///
    /// * `min_interval_seconds` - Seconds that must pass between notifications
    pub fn new(min_interval_seconds: u64) -> Self {
        let min_interval = i64::try_from(min_interval_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);

        Self {
            min_interval,
            last_sent_at: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<DateTime<Utc>>> {
        self.last_sent_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to take the permit for a notification now
    ///
    /// # Returns
    ///
    /// `true` if the interval has elapsed; the permit is consumed by this call.
    /// `false` if rate limited, leaving the state unchanged.
    pub fn permit(&self) -> bool {
        self.permit_at(Utc::now())
    }

    /// Try to take the permit at a specific time
    ///
    /// This is primarily used for testing with controlled timestamps.
    /// The first permit is always granted, whatever the interval.
    pub fn permit_at(&self, now: DateTime<Utc>) -> bool {
        let mut last_sent_at = self.lock();
        let permitted = match *last_sent_at {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.min_interval,
        };
        if permitted {
            *last_sent_at = Some(now);
        }
        permitted
    }

    /// Forget the last notification so the next call is permitted
    pub fn reset(&self) {
        *self.lock() = None;
    }

    /// Time left until the next permit can be granted
    pub fn remaining(&self) -> Duration {
        self.remaining_at(Utc::now())
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        let Some(last) = *self.lock() else {
            return Duration::zero();
        };
        let elapsed = now.signed_duration_since(last);
        self.min_interval
            .checked_sub(&elapsed)
            .unwrap_or(self.min_interval)
            .max(Duration::zero())
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// When the last permit was granted, if ever
    pub fn last_sent_at(&self) -> Option<DateTime<Utc>> {
        *self.lock()
    }
}
