//! Per-file retry decisions for the download pool.
//!
//! A failed transfer is sorted into a [`FailureType`] by [`classify_error`].
//! Permanent failures (missing files, local disk errors) are reported at
//! once. Transient ones and server throttling are retried with a doubling
//! wait until the policy's attempt budget is spent.
//!
//! ```
//! use ripper_core::download::{DownloadError, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::with_max_attempts(2);
//! let gateway = DownloadError::http_status("https://img.example.com/a.jpg", 502);
//!
//! assert!(matches!(policy.decide(&gateway, 1), RetryDecision::Retry { attempt: 2, .. }));
//! assert!(matches!(policy.decide(&gateway, 2), RetryDecision::DoNotRetry { .. }));
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;

/// Attempts per file when nothing else is configured, first try included.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const FIRST_WAIT: Duration = Duration::from_millis(750);
const LONGEST_WAIT: Duration = Duration::from_secs(20);

/// How a failed transfer should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Timeouts, dropped connections, 408 and 5xx.
    Transient,
    /// Anything another request cannot fix.
    Permanent,
    /// HTTP 429. Waits twice as long as a transient failure.
    RateLimited,
}

/// What the pool does after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make attempt number `attempt`.
    Retry { delay: Duration, attempt: u32 },
    /// Give up on this file.
    DoNotRetry { reason: String },
}

/// Attempt budget plus the doubling wait between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    first_wait: Duration,
    longest_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    /// Policy with explicit waits. At least one attempt is always made.
    #[must_use]
    pub fn new(max_attempts: u32, first_wait: Duration, longest_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            first_wait,
            longest_wait: longest_wait.max(first_wait),
        }
    }

    /// Default waits with a custom attempt budget.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self::new(max_attempts, FIRST_WAIT, LONGEST_WAIT)
    }

    /// One attempt per file.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::with_max_attempts(1)
    }

    /// Attempts per file, first try included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what follows failed attempt number `attempt` (counting from 1).
    #[instrument(level = "debug", skip(self, error), fields(%error))]
    pub fn decide(&self, error: &DownloadError, attempt: u32) -> RetryDecision {
        let failure = classify_error(error);
        if failure == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }
        if attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: format!("gave up after {attempt} attempts"),
            };
        }

        let mut delay = self.backoff(attempt);
        if failure == FailureType::RateLimited {
            delay = (delay * 2).min(self.longest_wait);
        }
        let delay = delay + jitter(delay);
        debug!(?failure, delay_ms = delay.as_millis(), "scheduling another attempt");
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// `first_wait * 2^(attempt - 1)`, capped at `longest_wait`.
    fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.first_wait
            .checked_mul(1 << doublings)
            .map_or(self.longest_wait, |wait| wait.min(self.longest_wait))
    }
}

/// Up to a fifth of `delay`, so parallel workers hitting one host spread out.
#[allow(clippy::cast_possible_truncation)]
fn jitter(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 5) as u64;
    if spread == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

/// Sorts a transfer error for [`RetryPolicy::decide`].
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status: 429, .. } => FailureType::RateLimited,
        DownloadError::HttpStatus {
            status: 408 | 500..=599,
            ..
        }
        | DownloadError::Timeout { .. }
        | DownloadError::Network { .. } => FailureType::Transient,
        DownloadError::HttpStatus { .. } | DownloadError::Io { .. } => FailureType::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> DownloadError {
        DownloadError::http_status("https://img.example.com/a.jpg", code)
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_server_error_is_retried_until_budget_spent() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(10));

        match policy.decide(&status(503), 1) {
            RetryDecision::Retry { delay, attempt } => {
                assert_eq!(attempt, 2);
                assert!(delay >= Duration::from_millis(10));
                assert!(delay <= Duration::from_millis(12));
            }
            other => panic!("expected retry, got {other:?}"),
        }
        assert!(matches!(
            policy.decide(&status(503), 3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_missing_file_is_not_retried() {
        let policy = RetryPolicy::with_max_attempts(5);
        assert!(matches!(
            policy.decide(&status(404), 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_rate_limited_waits_longer() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100), Duration::from_secs(5));
        let RetryDecision::Retry { delay, .. } = policy.decide(&status(429), 1) else {
            panic!("429 should be retried");
        };
        assert!(delay >= Duration::from_millis(200));
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_error(&status(403)), FailureType::Permanent);
        assert_eq!(classify_error(&status(408)), FailureType::Transient);
        assert_eq!(classify_error(&status(429)), FailureType::RateLimited);
        assert_eq!(classify_error(&status(500)), FailureType::Transient);
        assert_eq!(
            classify_error(&DownloadError::timeout("https://img.example.com/a.jpg")),
            FailureType::Transient
        );
        let disk = DownloadError::io("/rips/a.jpg", std::io::Error::other("disk full"));
        assert_eq!(classify_error(&disk), FailureType::Permanent);
    }
}
