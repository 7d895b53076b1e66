//! Retry executor — exponential backoff with symmetric jitter.
//!
//! The delay before retry `n` (1-based count of failed attempts) is
//! `base_delay × multiplier^(n-1)`, jittered by `±jitter` of itself, then
//! clamped to `max_delay`. The base for each attempt is derived from the
//! attempt number alone, so jitter never compounds across attempts.
//!
//! Exhausted retries come back as a [`RetryResult`] carrying every attempt,
//! never as a panic or an early bail-out.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Retryable;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the computed delay used as symmetric jitter, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Policy used around provider calls.
    pub fn provider() -> Self {
        Self::default()
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Same policy without jitter (deterministic delays).
    pub fn without_jitter(self) -> Self {
        Self { jitter: 0.0, ..self }
    }

    /// Unjittered delay after `attempt` failed attempts (1-based), clamped.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        clamp_secs(secs, self.max_delay)
    }

    /// Jittered delay after `attempt` failed attempts (1-based), clamped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        clamp_secs(base.as_secs_f64() * factor, self.max_delay)
    }
}

fn clamp_secs(secs: f64, max: Duration) -> Duration {
    if !secs.is_finite() || secs < 0.0 || secs > max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(secs)
    }
}

/// Diagnostic record of one attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub duration: Duration,
    /// Error message when the attempt failed.
    pub error: Option<String>,
    /// Wait scheduled after this attempt, if another one followed.
    pub delay: Option<Duration>,
}

/// Outcome of [`execute_with_retry`].
#[derive(Debug)]
pub struct RetryResult<T, E> {
    outcome: Result<T, E>,
    pub attempts: Vec<AttemptRecord>,
    pub total_duration: Duration,
}

impl<T, E> RetryResult<T, E> {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn result(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// The last error, when every attempt failed.
    pub fn error(&self) -> Option<&E> {
        self.outcome.as_ref().err()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Collapse into a plain `Result`, keeping the last error.
    pub fn into_result(self) -> Result<T, E> {
        self.outcome
    }
}

/// Run `operation` under `policy`, classifying failures via [`Retryable`].
pub async fn execute_with_retry<T, E, F, Fut>(operation: F, policy: &RetryPolicy) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    execute_with_classifier(operation, policy, |e: &E| e.is_retryable()).await
}

/// Run `operation` under `policy` with an explicit retryability classifier.
pub async fn execute_with_classifier<T, E, F, Fut, C>(
    mut operation: F,
    policy: &RetryPolicy,
    is_retryable: C,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> bool,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = Vec::with_capacity(max_attempts as usize);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let attempt_started = Instant::now();
        match operation().await {
            Ok(value) => {
                attempts.push(AttemptRecord {
                    attempt,
                    duration: attempt_started.elapsed(),
                    error: None,
                    delay: None,
                });
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return RetryResult {
                    outcome: Ok(value),
                    attempts,
                    total_duration: started.elapsed(),
                };
            }
            Err(err) => {
                let mut record = AttemptRecord {
                    attempt,
                    duration: attempt_started.elapsed(),
                    error: Some(err.to_string()),
                    delay: None,
                };

                if !is_retryable(&err) || attempt >= max_attempts {
                    attempts.push(record);
                    return RetryResult {
                        outcome: Err(err),
                        attempts,
                        total_duration: started.elapsed(),
                    };
                }

                let delay = policy.delay_for(attempt);
                record.delay = Some(delay);
                attempts.push(record);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::ProviderError;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(3000),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn exponential_delays_without_jitter() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(30),
            ..policy()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn delays_are_capped() {
        assert_eq!(policy().delay_for(3), Duration::from_millis(3000));
        assert_eq!(policy().delay_for(500), Duration::from_millis(3000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: 0.25,
            max_delay: Duration::from_secs(30),
            ..policy()
        };
        for _ in 0..200 {
            let delay = policy.delay_for(2).as_millis();
            assert!((1500..=2500).contains(&delay), "delay {delay}ms out of range");
        }
    }

    #[test]
    fn jittered_delay_never_exceeds_cap() {
        let policy = RetryPolicy {
            jitter: 0.3,
            ..policy()
        };
        for _ in 0..200 {
            assert!(policy.delay_for(2) <= Duration::from_millis(3000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ProviderError::network("local", "reset"))
                } else {
                    Ok("done")
                }
            },
            &policy(),
        )
        .await;

        assert!(result.success());
        assert_eq!(result.attempt_count(), 3);
        assert_eq!(result.attempts[0].delay, Some(Duration::from_millis(1000)));
        assert_eq!(result.attempts[1].delay, Some(Duration::from_millis(2000)));
        assert!(result.total_duration >= Duration::from_millis(3000));
        assert_eq!(result.into_result().unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: RetryResult<(), _> = execute_with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::invalid_input("local", "too long"))
            },
            &policy(),
        )
        .await;

        assert!(!result.success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.attempt_count(), 1);
        assert!(result.total_duration < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error_and_history() {
        let calls = AtomicU32::new(0);
        let result: RetryResult<(), _> = execute_with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::rate_limited("remote", format!("attempt {n}")))
            },
            &policy(),
        )
        .await;

        assert!(!result.success());
        assert_eq!(result.attempt_count(), 4);
        assert!(result.attempts.last().unwrap().delay.is_none());
        let err = result.into_result().unwrap_err();
        assert_eq!(err.message, "attempt 3");
    }

    #[tokio::test(start_paused = true)]
    async fn classifier_overrides_trait() {
        let calls = AtomicU32::new(0);
        let result: RetryResult<(), ProviderError> = execute_with_classifier(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::processing("remote", "boom"))
            },
            &policy(),
            |_| true,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(!result.success());
    }
}
