//! Retry policy shared by every outbound GitHub call.
//!
//! Only [`AppboxError::is_transient`] failures are retried. Delays grow exponentially from
//! [`INITIAL_RETRY_DELAY_MS`], are capped at [`MAX_RETRY_DELAY_MS`] and jittered.

use crate::constants::{DEFAULT_RETRY_ATTEMPTS, INITIAL_RETRY_DELAY_MS, MAX_RETRY_DELAY_MS};
use crate::core::AppboxError;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::debug;

/// Attempt count and delay bounds for network calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Policy with `attempts` total attempts (at least one) and the default delays.
    #[must_use]
    pub const fn new(attempts: u32) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            initial_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
        }
    }

    /// Override the delay bounds.
    #[must_use]
    pub const fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    /// Total attempts including the first.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    fn delays(&self) -> Vec<Duration> {
        // from_millis(2) yields 2, 4, 8, ... so the factor puts the first delay at `initial`
        let factor = (self.initial_delay.as_millis() as u64 / 2).max(1);
        let zero = self.initial_delay.is_zero();
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .map(move |delay| if zero { Duration::ZERO } else { jitter(delay) })
            .take(self.attempts.saturating_sub(1) as usize)
            .collect()
    }

    /// Run `action` until it succeeds, fails with a non-transient error, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `action`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut action: F) -> Result<T, AppboxError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppboxError>>,
    {
        let attempt = AtomicU32::new(0);
        let total = self.attempts;
        RetryIf::spawn(
            self.delays(),
            || {
                let n = attempt.fetch_add(1, Ordering::Relaxed) + 1;
                if n > 1 {
                    debug!(operation, attempt = n, total, "Retrying");
                }
                action()
            },
            |error: &AppboxError| {
                let retry = error.is_transient();
                if retry {
                    debug!(operation, %error, "Transient failure");
                }
                retry
            },
        )
        .await
    }
}
