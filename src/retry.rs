//! Bounded retry with capped exponential backoff
//!
//! [`Backoff`] produces the wait before each retry: `initial_delay` doubled
//! (by `backoff_multiplier`) per attempt, optionally stretched by up to 100%
//! of jitter, never above `max_delay`. A server hint such as HTTP
//! `Retry-After` replaces the computed wait for that one retry.
//!
//! ```no_run
//! use photos_dl::config::RetryConfig;
//! use photos_dl::retry::{IsRetryable, download_with_retry};
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str("flaky")
//!     }
//! }
//!
//! impl IsRetryable for Flaky {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! let attempted = download_with_retry(&config, || async { Ok::<_, Flaky>(()) }).await;
//! assert_eq!(attempted.attempts, 1);
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::DownloadError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies a failure as worth another attempt or not
pub trait IsRetryable {
    /// `true` for transient failures
    fn is_retryable(&self) -> bool;

    /// Wait requested by the server, replacing the computed backoff
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for DownloadError {
    fn is_retryable(&self) -> bool {
        // UrlExpired is handled by re-resolving once in the executor
        matches!(
            self,
            DownloadError::Network(_)
                | DownloadError::RateLimited { .. }
                | DownloadError::ServerError { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DownloadError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result of a retried operation plus the number of calls it took
#[derive(Debug)]
pub struct Attempted<T, E> {
    /// First success, or the error that ended the sequence
    pub result: Result<T, E>,
    /// Calls made, at least 1
    pub attempts: u32,
}

/// Wait schedule between attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    /// Schedule starting at `config.initial_delay`
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            next: config.initial_delay,
            max: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Wait before the next retry; advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next.min(self.max);
        self.next = scale(base, self.multiplier).unwrap_or(self.max).min(self.max);
        if self.jitter {
            jittered(base).min(self.max)
        } else {
            base
        }
    }
}

/// Call `operation` until it succeeds, fails permanently, or runs out of attempts
///
/// `config.max_attempts` counts the first call; 0 behaves like 1.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Attempted<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut backoff = Backoff::new(config);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::info!(attempts, "succeeded after retry");
                }
                return Attempted {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            tracing::debug!(error = %err, attempts, "permanent failure, not retrying");
            return Attempted {
                result: Err(err),
                attempts,
            };
        }
        if attempts >= max_attempts {
            tracing::warn!(error = %err, attempts, "giving up, attempts exhausted");
            return Attempted {
                result: Err(err),
                attempts,
            };
        }

        let computed = backoff.next_delay();
        let wait = err.retry_after().unwrap_or(computed);
        tracing::warn!(
            error = %err,
            attempt = attempts,
            max_attempts,
            wait_ms = wait.as_millis() as u64,
            "transient failure, retrying"
        );
        tokio::time::sleep(wait).await;
    }
}

/// `delay * factor`, or `None` when the product is not a representable duration
fn scale(delay: Duration, factor: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).ok()
}

/// Stretch `delay` by a uniform 0-100%
fn jittered(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    scale(delay, factor).unwrap_or(delay)
}
