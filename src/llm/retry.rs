// ============================================
// PROMPTGATE - Retry Policy with Backoff
// ============================================

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::error::ProviderError;
use crate::config::{BackoffKind, RetrySettings};

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// `initial * multiplier^n`, capped at `max`
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Add ±25% random jitter to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                initial: Duration::from_millis(500),
                multiplier: 2.0,
                max: Duration::from_secs(30),
            },
            jitter: true,
        }
    }
}

/// Transient record of one attempt inside the retry loop
#[derive(Debug)]
struct DispatchAttempt<'a> {
    attempt_number: u32,
    error: Option<&'a ProviderError>,
}

/// Why the retry loop gave up
#[derive(Debug, Clone, PartialEq)]
pub enum RetryFailure {
    /// A terminal error; retrying cannot help
    Aborted { attempts: u32, error: ProviderError },
    /// Every allowed attempt failed with a transient error
    Exhausted { attempts: u32, error: ProviderError },
    /// Cancellation was observed before a result was produced
    Cancelled { attempts: u32 },
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
            jitter: false,
        }
    }

    /// Quick fixed-delay retries, mostly useful in tests
    pub fn quick() -> Self {
        Self::new(3, Backoff::Fixed(Duration::from_millis(10)))
    }

    /// Single attempt, never retries
    pub fn none() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        let initial = Duration::from_millis(settings.initial_delay_ms);
        let backoff = match settings.backoff {
            BackoffKind::Fixed => Backoff::Fixed(initial),
            BackoffKind::Exponential => Backoff::Exponential {
                initial,
                multiplier: settings.multiplier,
                max: Duration::from_millis(settings.max_delay_ms),
            },
        };
        Self {
            max_attempts: settings.max_attempts,
            backoff,
            jitter: settings.jitter,
        }
    }

    fn attempts_allowed(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculate delay after the given (zero-based) failed attempt
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let mut delay_ms = match &self.backoff {
            Backoff::Fixed(delay) => delay.as_millis() as f64,
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let base = initial.as_millis() as f64 * multiplier.powi(attempt as i32);
                base.min(max.as_millis() as f64)
            }
        };

        if self.jitter {
            let jitter_range = delay_ms * 0.25;
            let jitter = (rand_simple() * 2.0 - 1.0) * jitter_range;
            delay_ms = (delay_ms + jitter).max(0.0);
        }

        Duration::from_millis(delay_ms as u64)
    }

    /// Run `operation` until it succeeds, fails terminally, runs out of
    /// attempts, or `cancel` fires. Returns the value and the attempt count.
    pub async fn run<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<(T, u32), RetryFailure>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.attempts_allowed();
        let mut attempt_number = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryFailure::Cancelled {
                    attempts: attempt_number,
                });
            }
            attempt_number += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryFailure::Cancelled { attempts: attempt_number });
                }
                outcome = operation() => outcome,
            };

            let error = match outcome {
                Ok(value) => return Ok((value, attempt_number)),
                Err(e) => e,
            };

            let attempt = DispatchAttempt {
                attempt_number,
                error: Some(&error),
            };

            if !error.is_transient() {
                tracing::error!(?attempt, "Permanent error, not retrying");
                return Err(RetryFailure::Aborted {
                    attempts: attempt_number,
                    error,
                });
            }

            if attempt_number >= max_attempts {
                tracing::warn!(?attempt, max_attempts, "Retries exhausted");
                return Err(RetryFailure::Exhausted {
                    attempts: attempt_number,
                    error,
                });
            }

            let delay = self.delay_for_attempt(attempt_number - 1);
            tracing::warn!(
                "Attempt {}/{} failed: {}. Retrying in {:?}...",
                attempt_number,
                max_attempts,
                error,
                delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryFailure::Cancelled { attempts: attempt_number });
                }
                _ = sleep(delay) => {}
            }
        }
    }
}

/// Simple pseudo-random number generator (0.0 to 1.0)
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
