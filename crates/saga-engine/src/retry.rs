//! Exponential backoff retry policy.
//!
//! The decision part ([`RetryPolicy::backoff`], [`RetryPolicy::decide`]) is
//! pure; [`RetryPolicy::run`] drives an async operation with it, sleeping on
//! the tokio clock between attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::StoreError;
use crate::model::StageError;

/// Errors that know whether another attempt may succeed.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for StageError {
    fn is_transient(&self) -> bool {
        StageError::is_transient(self)
    }
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again.
    RetryAfter(Duration),
    /// Stop. `exhausted` is set when the error was transient but no attempts remain.
    GiveUp { exhausted: bool },
}

/// A successful result together with the attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
    /// Delays slept before each retry, in order.
    pub delays: Vec<Duration>,
}

/// The last error once the policy gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
    /// The error was transient and the attempt budget ran out.
    pub exhausted: bool,
    pub delays: Vec<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    /// Create a policy with a x2.0 multiplier, no cap beyond 30 s and no jitter.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }

    /// Single attempt, never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (0-based), without jitter:
    /// `initial_delay * multiplier^retry`, capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let secs = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Decide what follows failed attempt number `attempt` (1-based).
    pub fn decide(&self, attempt: u32, transient: bool) -> RetryDecision {
        if !transient {
            return RetryDecision::GiveUp { exhausted: false };
        }
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp { exhausted: true };
        }
        RetryDecision::RetryAfter(self.jittered(attempt - 1))
    }

    /// Backoff for `retry` plus 10-30% when jitter is enabled.
    ///
    /// The result never exceeds the base backoff of the following retry, so
    /// jittered delays stay non-decreasing and within `max_delay`.
    fn jittered(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let ceiling = self.backoff(retry.saturating_add(1));
        let factor = rand::thread_rng().gen_range(0.1..0.3);
        (delay + delay.mul_f64(factor)).min(ceiling)
    }

    /// Run `op` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<Attempted<T>, RetryFailure<E>>
    where
        E: Retryable + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delays = Vec::new();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                        delays,
                    })
                }
                Err(error) => match self.decide(attempt, error.is_transient()) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::warn!(
                            attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        delays.push(delay);
                        attempt += 1;
                    }
                    RetryDecision::GiveUp { exhausted } => {
                        if exhausted {
                            tracing::error!(
                                attempts = attempt,
                                error = %error,
                                "Attempt failed after all retries"
                            );
                        }
                        return Err(RetryFailure {
                            error,
                            attempts: attempt,
                            exhausted,
                            delays,
                        });
                    }
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}
