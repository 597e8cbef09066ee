//! Fixed-window counters keyed by client IP.
//!
//! Two users: the admin request cap and the failed admin-token tracker.
//! Counters live in a bounded `moka` cache and expire with their window, so
//! idle clients cost nothing. Increments are atomic per key.

use std::future::ready;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};

/// Upper bound on tracked clients per counter.
const MAX_TRACKED_KEYS: u64 = 50_000;

/// Admin requests are counted per minute.
pub const ADMIN_REQUEST_WINDOW: Duration = Duration::from_secs(60);

/// Failed admin-token attempts are counted over 15 minutes.
pub const FAILED_AUTH_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Failures within [`FAILED_AUTH_WINDOW`] that lock a client out.
pub const MAX_FAILED_AUTH_ATTEMPTS: u32 = 5;

/// One client's count in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

impl Window {
    fn first(now: DateTime<Utc>, length: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + chrono::Duration::from_std(length).unwrap_or_default(),
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.reset_at > now
    }
}

/// Counts events per key in fixed windows of a set length.
#[derive(Clone)]
pub struct FixedWindowCounter {
    windows: Cache<String, Window>,
    length: Duration,
}

impl FixedWindowCounter {
    #[must_use]
    pub fn new(length: Duration) -> Self {
        Self {
            windows: Cache::builder()
                .max_capacity(MAX_TRACKED_KEYS)
                .time_to_live(length)
                .build(),
            length,
        }
    }

    /// Count one event for `key`, starting a new window if the last expired.
    pub async fn hit(&self, key: &str) -> Window {
        let now = Utc::now();
        let length = self.length;
        let result = self
            .windows
            .entry(key.to_string())
            .and_compute_with(|entry| {
                let next = match entry.map(|e| e.into_value()) {
                    Some(w) if w.is_live(now) => Window {
                        count: w.count.saturating_add(1),
                        ..w
                    },
                    _ => Window::first(now, length),
                };
                ready(Op::Put(next))
            })
            .await;

        match result {
            CompResult::Inserted(e)
            | CompResult::ReplacedWith(e)
            | CompResult::Unchanged(e)
            | CompResult::Removed(e) => e.into_value(),
            CompResult::StillNone(_) => Window::first(now, length),
        }
    }

    /// The live window for `key`, if any.
    pub async fn peek(&self, key: &str) -> Option<Window> {
        let now = Utc::now();
        self.windows.get(key).await.filter(|w| w.is_live(now))
    }

    /// Forget `key`.
    pub async fn reset(&self, key: &str) {
        self.windows.invalidate(key).await;
    }
}

/// Caps requests per client per window.
#[derive(Clone)]
pub struct RequestLimiter {
    counter: FixedWindowCounter,
    max_requests: u32,
}

impl RequestLimiter {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            counter: FixedWindowCounter::new(window),
            max_requests,
        }
    }

    /// Count a request.
    ///
    /// # Errors
    ///
    /// Returns when the window resets if this request is over the cap.
    pub async fn check(&self, client: &str) -> Result<(), DateTime<Utc>> {
        let window = self.counter.hit(client).await;
        if window.count > self.max_requests {
            return Err(window.reset_at);
        }
        Ok(())
    }
}

/// Tracks failed authentication attempts and locks out repeat offenders.
#[derive(Clone)]
pub struct FailedAuthTracker {
    counter: FixedWindowCounter,
    max_failures: u32,
}

impl Default for FailedAuthTracker {
    fn default() -> Self {
        Self::new(MAX_FAILED_AUTH_ATTEMPTS, FAILED_AUTH_WINDOW)
    }
}

impl FailedAuthTracker {
    #[must_use]
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            counter: FixedWindowCounter::new(window),
            max_failures,
        }
    }

    /// When the lockout ends, if `client` is locked out.
    pub async fn locked_until(&self, client: &str) -> Option<DateTime<Utc>> {
        self.counter
            .peek(client)
            .await
            .filter(|w| w.count >= self.max_failures)
            .map(|w| w.reset_at)
    }

    /// Record a failure. Returns the failure count in the current window.
    pub async fn record_failure(&self, client: &str) -> u32 {
        let window = self.counter.hit(client).await;
        if window.count == self.max_failures {
            tracing::warn!(
                client,
                reset_at = %window.reset_at,
                "Client locked out after repeated admin auth failures"
            );
        }
        window.count
    }

    /// Clear a client's failures after a successful authentication.
    pub async fn clear(&self, client: &str) {
        self.counter.reset(client).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counter_counts_within_window() {
        let counter = FixedWindowCounter::new(Duration::from_secs(60));
        assert_eq!(counter.hit("1.2.3.4").await.count, 1);
        assert_eq!(counter.hit("1.2.3.4").await.count, 2);
        assert_eq!(counter.hit("5.6.7.8").await.count, 1);
        assert_eq!(counter.peek("1.2.3.4").await.unwrap().count, 2);

        counter.reset("1.2.3.4").await;
        assert!(counter.peek("1.2.3.4").await.is_none());
    }

    #[tokio::test]
    async fn test_counter_starts_new_window_after_expiry() {
        let counter = FixedWindowCounter::new(Duration::from_millis(50));
        counter.hit("ip").await;
        counter.hit("ip").await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.hit("ip").await.count, 1);
    }

    #[tokio::test]
    async fn test_request_limiter_caps() {
        let limiter = RequestLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check("ip").await.is_ok());
        }
        let reset_at = limiter.check("ip").await.unwrap_err();
        assert!(reset_at > Utc::now());
        assert!(limiter.check("other").await.is_ok());
    }

    #[tokio::test]
    async fn test_lockout_after_max_failures() {
        let tracker = FailedAuthTracker::default();
        for attempt in 1..MAX_FAILED_AUTH_ATTEMPTS {
            assert_eq!(tracker.record_failure("ip").await, attempt);
            assert!(tracker.locked_until("ip").await.is_none());
        }
        tracker.record_failure("ip").await;
        assert!(tracker.locked_until("ip").await.is_some());

        tracker.clear("ip").await;
        assert!(tracker.locked_until("ip").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_hits_are_all_counted() {
        let counter = FixedWindowCounter::new(Duration::from_secs(60));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let counter = counter.clone();
            handles.push(tokio::spawn(async move { counter.hit("ip").await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.peek("ip").await.unwrap().count, 50);
    }
}
