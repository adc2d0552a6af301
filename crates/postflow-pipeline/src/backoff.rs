//! Bounded retry with exponential backoff
//!
//! [`Backoff`] wraps any fallible async operation. Attempts are numbered
//! `1..=max_attempts`; after a retryable failure the caller's task sleeps for
//! the current delay, the delay is multiplied by the backoff factor, and the
//! operation runs again. A non-retryable failure, or a failure on the last
//! attempt, is returned to the caller unchanged.
//!
//! ```no_run
//! # use postflow_pipeline::backoff::Backoff;
//! # use std::time::Duration;
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let backoff = Backoff::new(3, Duration::from_secs(2), 2.0)?;
//! let body = backoff
//!     .execute(|| async { reqwest::get("https://example.com").await?.text().await }, |_| true)
//!     .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

use postflow_common::ConfigError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Retry schedule: attempt cap, first delay and growth factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    max_attempts: u32,
    initial_delay: Duration,
    factor: f64,
}

impl Backoff {
    /// Validate and build a schedule.
    ///
    /// `max_attempts` must be at least 1 and `factor` a finite positive
    /// number. A zero `initial_delay` retries immediately.
    pub fn new(max_attempts: u32, initial_delay: Duration, factor: f64) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::invalid(
                "API_RETRY_MAX_ATTEMPTS",
                "0",
                "at least one attempt is required",
            ));
        }

        if !factor.is_finite() || factor <= 0.0 {
            return Err(ConfigError::invalid(
                "API_RETRY_BACKOFF",
                factor.to_string(),
                "backoff factor must be a positive number",
            ));
        }

        Ok(Self {
            max_attempts,
            initial_delay,
            factor,
        })
    }

    /// Delay that follows `delay`, saturating instead of overflowing
    pub fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.factor).unwrap_or(Duration::MAX)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `is_retryable` decides whether a failure is worth another attempt. The
    /// wait between attempts is awaited on the calling task; nothing else of
    /// the caller's work proceeds in the meantime.
    pub async fn execute<T, E, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut delay = self.initial_delay;
        let mut attempt = 1;

        loop {
            debug!(attempt, max_attempts = self.max_attempts, "Attempt {}/{}", attempt, self.max_attempts);

            let err = match operation().await {
                Ok(value) => {
                    info!(attempt, "Success on attempt {}", attempt);
                    return Ok(value);
                },
                Err(err) => err,
            };

            if !is_retryable(&err) {
                error!(attempt, error = %err, "Attempt {} failed with a non-retryable error", attempt);
                return Err(err);
            }

            if attempt >= self.max_attempts {
                error!(attempt, error = %err, "All {} attempts failed", self.max_attempts);
                return Err(err);
            }

            warn!(
                attempt,
                error = %err,
                delay_secs = delay.as_secs_f64(),
                "Attempt {} failed, retrying in {:.2}s",
                attempt,
                delay.as_secs_f64()
            );

            tokio::time::sleep(delay).await;
            delay = self.next_delay(delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum Flaky {
        Transient(u32),
        Permanent,
    }

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Flaky::Transient(n) => write!(f, "transient failure #{}", n),
                Flaky::Permanent => write!(f, "permanent failure"),
            }
        }
    }

    fn retry_transient(e: &Flaky) -> bool {
        matches!(e, Flaky::Transient(_))
    }

    /// The paused clock advances to timer deadlines on millisecond ticks
    fn assert_waited(started: Instant, expected: Duration) {
        let elapsed = started.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(10),
            "expected ~{:?} of waiting, got {:?}",
            expected,
            elapsed
        );
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = Backoff::new(0, Duration::from_secs(1), 2.0).unwrap_err();
        assert_eq!(err.key(), "API_RETRY_MAX_ATTEMPTS");
    }

    #[test]
    fn test_rejects_non_positive_factor() {
        assert!(Backoff::new(3, Duration::from_secs(1), 0.0).is_err());
        assert!(Backoff::new(3, Duration::from_secs(1), -2.0).is_err());
        assert!(Backoff::new(3, Duration::from_secs(1), f64::NAN).is_err());
        assert!(Backoff::new(3, Duration::from_secs(1), 0.5).is_ok());
    }

    #[test]
    fn test_next_delay_grows_and_saturates() {
        let backoff = Backoff::new(3, Duration::from_secs(2), 2.0).unwrap();
        assert_eq!(backoff.next_delay(Duration::from_secs(2)), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(Duration::MAX), Duration::MAX);

        let constant = Backoff::new(3, Duration::from_secs(2), 1.0).unwrap();
        assert_eq!(constant.next_delay(Duration::from_secs(2)), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_two_failures_waits_twice() {
        let backoff = Backoff::new(3, Duration::from_secs(1), 2.0).unwrap();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = Instant::now();

        let result = backoff
            .execute(
                move || async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(Flaky::Transient(n))
                    } else {
                        Ok("payload")
                    }
                },
                retry_transient,
            )
            .await;

        assert_eq!(result, Ok("payload"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second
        assert_waited(started, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_stops_after_max_attempts() {
        let backoff = Backoff::new(3, Duration::from_secs(1), 2.0).unwrap();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = Instant::now();

        let result: Result<(), Flaky> = backoff
            .execute(
                move || async move { Err(Flaky::Transient(counter.fetch_add(1, Ordering::SeqCst) + 1)) },
                retry_transient,
            )
            .await;

        assert_eq!(result, Err(Flaky::Transient(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_waited(started, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_propagates_immediately() {
        let backoff = Backoff::new(5, Duration::from_secs(1), 2.0).unwrap();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = Instant::now();

        let result: Result<(), Flaky> = backoff
            .execute(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Flaky::Permanent)
                },
                retry_transient,
            )
            .await;

        assert_eq!(result, Err(Flaky::Permanent));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_waited(started, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_and_zero_delays() {
        let constant = Backoff::new(4, Duration::from_millis(500), 1.0).unwrap();
        let started = Instant::now();
        let result: Result<(), Flaky> =
            constant.execute(|| async { Err(Flaky::Transient(0)) }, retry_transient).await;
        assert!(result.is_err());
        assert_waited(started, Duration::from_millis(1500));

        let immediate = Backoff::new(3, Duration::ZERO, 2.0).unwrap();
        let started = Instant::now();
        let result: Result<(), Flaky> =
            immediate.execute(|| async { Err(Flaky::Transient(0)) }, retry_transient).await;
        assert!(result.is_err());
        assert_waited(started, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_never_waits() {
        let backoff = Backoff::new(1, Duration::from_secs(10), 2.0).unwrap();
        let started = Instant::now();
        let result: Result<(), Flaky> =
            backoff.execute(|| async { Err(Flaky::Transient(1)) }, retry_transient).await;
        assert_eq!(result, Err(Flaky::Transient(1)));
        assert_waited(started, Duration::ZERO);
    }
}
