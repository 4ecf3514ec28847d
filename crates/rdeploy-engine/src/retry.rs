//! Exponential backoff with jitter around a single fallible operation.
//!
//! The delay before attempt `n + 1` is
//! `min(max_delay, initial_delay * multiplier^(n - 1))` plus a uniform random
//! addend in `[0, delay / 4]`. The jitter is added after the cap, so a
//! jittered delay can exceed `max_delay` by up to a quarter.

use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use rdeploy_config::RetrySettings;
use rdeploy_utils::Clock;

/// Source of the random addend applied to each backoff delay.
pub trait JitterSource: Send + Sync {
    /// Return an addend in `[0, delay / 4]`.
    fn jitter(&self, delay: Duration) -> Duration;
}

/// Uniform jitter from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn jitter(&self, delay: Duration) -> Duration {
        let max = delay.as_secs_f64() / 4.0;
        if max <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=max))
    }
}

/// Deterministic jitter: always `fraction` of the maximum addend.
///
/// `FixedJitter::none()` disables jitter entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedJitter {
    fraction: f64,
}

impl FixedJitter {
    /// `fraction` is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(fraction: f64) -> Self {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { fraction }
    }

    #[must_use]
    pub fn none() -> Self {
        Self::new(0.0)
    }

    /// Always the full quarter.
    #[must_use]
    pub fn max() -> Self {
        Self::new(1.0)
    }
}

impl JitterSource for FixedJitter {
    fn jitter(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.fraction / 4.0)
    }
}

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        let initial_delay =
            Duration::try_from_secs_f64(settings.initial_delay).unwrap_or(Duration::from_secs(1));
        let max_delay = Duration::try_from_secs_f64(settings.max_delay).unwrap_or(initial_delay);
        Self {
            max_attempts: settings.max_attempts,
            initial_delay,
            multiplier: settings.multiplier,
            max_delay,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_delay,
        }
    }

    /// Pre-jitter delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if secs.is_nan() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { error: String },
}

/// One entry of a retry history.
///
/// `base_delay`/`delay` are the pre- and post-jitter wait that followed the
/// attempt; both are `None` when no wait followed (success or final failure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryAttempt {
    pub attempt: u32,
    #[serde(serialize_with = "crate::serde_secs::option::serialize")]
    pub base_delay: Option<Duration>,
    #[serde(serialize_with = "crate::serde_secs::option::serialize")]
    pub delay: Option<Duration>,
    pub outcome: AttemptOutcome,
}

impl RetryAttempt {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Failed { .. })
    }
}

/// Result of a retried operation plus its full history.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub history: Vec<RetryAttempt>,
}

/// Every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub last_error: E,
    pub history: Vec<RetryAttempt>,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up after {} attempts: {}",
            self.history.len(),
            self.last_error
        )
    }
}

impl<T, E> RetryOutcome<T, E> {
    /// Pair the success value with its history, or surface the exhaustion.
    ///
    /// # Errors
    ///
    /// Returns [`RetryExhausted`] carrying the last error and the history.
    pub fn into_result(self) -> Result<(T, Vec<RetryAttempt>), RetryExhausted<E>> {
        match self.result {
            Ok(value) => Ok((value, self.history)),
            Err(last_error) => Err(RetryExhausted {
                last_error,
                history: self.history,
            }),
        }
    }
}

/// Runs an operation up to `max_attempts` times with backoff between failures.
#[derive(Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    jitter: Arc<dyn JitterSource>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RetryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryController")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryController {
    #[must_use]
    pub fn new(policy: RetryPolicy, jitter: Arc<dyn JitterSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            jitter,
            clock,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `operation` (given the 1-based attempt number) until it
    /// succeeds or `max_attempts` is reached. There is no wait after the
    /// final failed attempt, and the failure is always returned.
    pub async fn retry<T, E, F, Fut>(&self, key: &str, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut history = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match operation(attempt).await {
                Ok(value) => {
                    history.push(RetryAttempt {
                        attempt,
                        base_delay: None,
                        delay: None,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return RetryOutcome {
                        result: Ok(value),
                        history,
                    };
                }
                Err(error) => error,
            };

            if attempt >= max_attempts {
                warn!(service = key, attempt, error = %error, "Attempts exhausted");
                history.push(RetryAttempt {
                    attempt,
                    base_delay: None,
                    delay: None,
                    outcome: AttemptOutcome::Failed {
                        error: error.to_string(),
                    },
                });
                return RetryOutcome {
                    result: Err(error),
                    history,
                };
            }

            let base_delay = self.policy.base_delay(attempt);
            let delay = base_delay + self.jitter.jitter(base_delay);
            debug!(
                service = key,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, backing off"
            );
            history.push(RetryAttempt {
                attempt,
                base_delay: Some(base_delay),
                delay: Some(delay),
                outcome: AttemptOutcome::Failed {
                    error: error.to_string(),
                },
            });
            self.clock.sleep(delay).await;
        }
    }
}
