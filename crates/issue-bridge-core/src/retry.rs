//! Bounded retry with exponential backoff and server-directed rate-limit waits.
//!
//! The policy never sleeps on its own: every delay goes through a [`Sleeper`],
//! so tests can swap in [`RecordingSleeper`] and assert the exact schedule.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::telemetry::RunTelemetry;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 5;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_MAX_RATE_LIMIT_WAITS: usize = 10;

/// Blocks the calling thread for a requested delay.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Sleeper that records requested delays instead of blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|delays| delays.clone())
            .unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// Classification of one failed attempt.
#[derive(Debug)]
pub enum AttemptFailure<E> {
    /// The server asked us to wait; does not consume an attempt.
    RateLimited { retry_after: Duration, error: E },
    /// 5xx or network failure; retried with backoff until attempts run out.
    Transient(E),
    /// Anything else; returned immediately.
    Permanent(E),
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    max_rate_limit_waits: usize,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("max_rate_limit_waits", &self.max_rate_limit_waits)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_max_rate_limit_waits(mut self, waits: usize) -> Self {
        self.max_rate_limit_waits = waits;
        self
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based):
    /// `base * 2^attempt`, capped at the maximum delay.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
        let factor = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `call` until it succeeds, fails permanently, or exhausts the policy.
    ///
    /// `call` receives the 0-based index of the request being sent. The error
    /// of the last failed attempt is returned when the policy gives up.
    pub fn run<T, E, F>(&self, telemetry: &RunTelemetry, operation: &str, mut call: F) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnMut(usize) -> Result<T, AttemptFailure<E>>,
    {
        let mut request_index = 0_usize;
        let mut failed_attempts = 0_usize;
        let mut rate_limit_waits = 0_usize;
        loop {
            telemetry.record_request();
            let outcome = call(request_index);
            request_index = request_index.saturating_add(1);
            match outcome {
                Ok(value) => return Ok(value),
                Err(AttemptFailure::Permanent(error)) => return Err(error),
                Err(AttemptFailure::RateLimited { retry_after, error }) => {
                    if rate_limit_waits >= self.max_rate_limit_waits {
                        tracing::error!(
                            parent: telemetry.span(),
                            operation,
                            rate_limit_waits,
                            "giving up after repeated rate limiting: {error}"
                        );
                        return Err(error);
                    }
                    rate_limit_waits = rate_limit_waits.saturating_add(1);
                    telemetry.record_rate_limit_wait();
                    tracing::warn!(
                        parent: telemetry.span(),
                        operation,
                        retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                        "rate limited, waiting before retry"
                    );
                    self.sleeper.sleep(retry_after);
                }
                Err(AttemptFailure::Transient(error)) => {
                    failed_attempts = failed_attempts.saturating_add(1);
                    if failed_attempts >= self.max_attempts {
                        tracing::error!(
                            parent: telemetry.span(),
                            operation,
                            attempts = failed_attempts,
                            "retries exhausted: {error}"
                        );
                        return Err(error);
                    }
                    let delay = self.backoff_delay(failed_attempts);
                    telemetry.record_retry_attempt();
                    tracing::warn!(
                        parent: telemetry.span(),
                        operation,
                        attempt = failed_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "transient failure, backing off: {error}"
                    );
                    self.sleeper.sleep(delay);
                }
            }
        }
    }
}
