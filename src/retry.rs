//! Bounded retry with linear or exponential backoff
//!
//! Used by the result fetcher. `max_attempts` counts every call of the operation,
//! the first one included, so the worst-case latency of a fully failing run is the
//! sum of `delay_for(1..max_attempts)` plus the time spent in the attempts.
//!
//! # Example
//!
//! ```no_run
//! use genjob::retry::{IsRetryable, RetryPolicy, retry_with_backoff};
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let policy = RetryPolicy::default();
//! retry_with_backoff(&policy, |_attempt| async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{Backoff, FetchConfig};
use crate::error::{Error, ProviderError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx answers) return `true`.
/// Permanent failures (malformed URL, rejected credentials) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Provider(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Unreachable { .. })
    }
}

/// How many times to try and how long to wait in between
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Base delay
    pub delay: Duration,
    /// Growth of the delay per attempt
    pub backoff: Backoff,
    /// Cap applied to each computed delay
    pub max_delay: Duration,
    /// Stretch each delay by a random 0-100%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.delay,
            backoff: config.backoff,
            max_delay: config.max_delay,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based), before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            Backoff::Linear => self.delay.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    /// Sum of all delays a fully failing run sleeps through
    pub fn worst_case_delay(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_for(attempt))
            .sum()
    }
}

/// Execute an async operation, retrying transient failures with backoff
///
/// The operation receives the 1-based attempt number. The delay is applied between
/// attempts, never before the first one. Returns the first success, the first
/// non-retryable error, or the last error once `max_attempts` calls have failed.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                let delay = if policy.jitter { add_jitter(delay) } else { delay };

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
