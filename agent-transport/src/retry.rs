//! Bounded exponential backoff for transient failures.

use std::num::NonZeroU32;
use std::time::Duration;

use hyper::StatusCode;

/// Retry limits applied to polling and action submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. `max_delay` is raised to `initial_delay` if smaller.
    #[must_use]
    pub fn new(max_attempts: NonZeroU32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    /// Policy that makes a single attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(NonZeroU32::MIN, Duration::ZERO, Duration::ZERO)
    }

    /// Returns the attempt ceiling, including the first attempt.
    #[must_use]
    pub const fn max_attempts(self) -> NonZeroU32 {
        self.max_attempts
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub const fn initial_delay(self) -> Duration {
        self.initial_delay
    }

    /// Returns the delay cap.
    #[must_use]
    pub const fn max_delay(self) -> Duration {
        self.max_delay
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..attempt {
            delay = delay.saturating_mul(2).min(self.max_delay);
        }
        delay.min(self.max_delay)
    }

    /// Like [`Self::delay_after`], but honours a server hint capped at `max_delay`.
    #[must_use]
    pub fn delay_with_hint(self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.map_or_else(|| self.delay_after(attempt), |hint| hint.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::MIN.saturating_add(2),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Statuses worth another attempt: request timeout, rate limiting, server errors.
#[must_use]
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}
