//! Shared GitHub API quota tracking.
//!
//! One [`RateLimitTracker`] is shared (via `Arc`) by every resolver in a batch. Responses update
//! it from the `x-ratelimit-remaining` / `x-ratelimit-reset` headers; before each request the
//! resolver calls [`RateLimitTracker::wait_if_needed`], which sleeps until the reset when the
//! remaining quota is below the threshold. The gate is advisory: it never blocks other tasks and
//! concurrent callers may all pass it at once.

use crate::core::AppboxError;
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const UNKNOWN: u64 = u64::MAX;

/// Remaining-quota tracker updated from response headers.
#[derive(Debug)]
pub struct RateLimitTracker {
    remaining: AtomicU64,
    reset_at: AtomicU64,
    threshold: u64,
    max_wait: Duration,
}

impl RateLimitTracker {
    /// Create a tracker that waits when fewer than `threshold` calls remain, for at most
    /// `max_wait`.
    #[must_use]
    pub const fn new(threshold: u64, max_wait: Duration) -> Self {
        Self {
            remaining: AtomicU64::new(UNKNOWN),
            reset_at: AtomicU64::new(0),
            threshold,
            max_wait,
        }
    }

    /// Remaining quota, or `None` before the first response.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        match self.remaining.load(Ordering::Relaxed) {
            UNKNOWN => None,
            remaining => Some(remaining),
        }
    }

    /// Record the quota headers of a response. Missing or unparsable headers are ignored.
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        if let Some(remaining) = header_u64(headers, "x-ratelimit-remaining") {
            self.remaining.store(remaining, Ordering::Relaxed);
        }
        if let Some(reset) = header_u64(headers, "x-ratelimit-reset") {
            self.reset_at.store(reset, Ordering::Relaxed);
        }
    }

    /// Seconds until the quota resets.
    #[must_use]
    pub fn reset_in_secs(&self) -> u64 {
        self.reset_in(unix_now())
    }

    /// Longest wait this tracker will sleep for.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Record quota values directly.
    pub fn record(&self, remaining: u64, reset_at_unix: u64) {
        self.remaining.store(remaining, Ordering::Relaxed);
        self.reset_at.store(reset_at_unix, Ordering::Relaxed);
    }

    /// Seconds until the quota resets, measured from `now` (unix seconds).
    fn reset_in(&self, now: u64) -> u64 {
        self.reset_at.load(Ordering::Relaxed).saturating_sub(now)
    }

    /// How long a caller should wait before the next request, if at all.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::RateLimited`] when the quota is exhausted and the reset lies
    /// beyond the wait cap.
    pub fn required_wait(&self, now: u64) -> Result<Option<Duration>, AppboxError> {
        let Some(remaining) = self.remaining() else {
            return Ok(None);
        };
        if remaining >= self.threshold {
            return Ok(None);
        }

        let reset_in = self.reset_in(now);
        if reset_in == 0 {
            return Ok(None);
        }
        let wait = Duration::from_secs(reset_in);
        if wait > self.max_wait {
            if remaining == 0 {
                return Err(AppboxError::RateLimited {
                    reset_in_secs: reset_in,
                });
            }
            return Ok(Some(self.max_wait));
        }
        Ok(Some(wait))
    }

    /// Sleep until the quota resets if it is running low.
    ///
    /// # Errors
    ///
    /// Returns [`AppboxError::Cancelled`] if `cancel` fires during the wait, or
    /// [`AppboxError::RateLimited`] if the reset is beyond the wait cap.
    pub async fn wait_if_needed(&self, cancel: &CancellationToken) -> Result<(), AppboxError> {
        let Some(wait) = self.required_wait(unix_now())? else {
            return Ok(());
        };

        warn!(
            remaining = ?self.remaining(),
            wait_secs = wait.as_secs(),
            "GitHub API quota low, waiting for reset"
        );
        tokio::select! {
            () = tokio::time::sleep(wait) => {
                debug!("Rate limit wait finished");
                Ok(())
            }
            () = cancel.cancelled() => Err(AppboxError::Cancelled),
        }
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_unknown_quota_never_waits() {
        let tracker = RateLimitTracker::new(10, Duration::from_secs(60));
        assert_eq!(tracker.required_wait(1_000).unwrap(), None);
    }

    #[test]
    fn test_headers_update_tracker() {
        let tracker = RateLimitTracker::new(10, Duration::from_secs(60));
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));
        tracker.update_from_headers(&headers);

        assert_eq!(tracker.remaining(), Some(42));
        assert_eq!(tracker.reset_in(1_699_999_990), 10);
    }

    #[test]
    fn test_low_quota_waits_until_reset() {
        let tracker = RateLimitTracker::new(10, Duration::from_secs(60));
        tracker.record(3, 1_030);
        assert_eq!(tracker.required_wait(1_000).unwrap(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_wait_is_capped() {
        let tracker = RateLimitTracker::new(10, Duration::from_secs(60));
        tracker.record(3, 5_000);
        assert_eq!(tracker.required_wait(1_000).unwrap(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_exhausted_beyond_cap_is_error() {
        let tracker = RateLimitTracker::new(10, Duration::from_secs(60));
        tracker.record(0, 5_000);
        let err = tracker.required_wait(1_000).unwrap_err();
        assert!(matches!(err, AppboxError::RateLimited { reset_in_secs: 4_000 }));
    }

    #[test]
    fn test_past_reset_does_not_wait() {
        let tracker = RateLimitTracker::new(10, Duration::from_secs(60));
        tracker.record(0, 900);
        assert_eq!(tracker.required_wait(1_000).unwrap(), None);
    }

    #[tokio::test]
    async fn test_wait_interrupted_by_cancellation() {
        let tracker = RateLimitTracker::new(10, Duration::from_secs(3600));
        tracker.record(1, unix_now() + 600);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tracker.wait_if_needed(&cancel).await;
        assert!(matches!(result, Err(AppboxError::Cancelled)));
    }
}
