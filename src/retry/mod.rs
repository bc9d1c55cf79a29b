//! Retry with exponential backoff and full jitter
//!
//! The delay before retry `n` (0-based) is drawn uniformly from
//! `[0, min(initial_delay * factor^n, max_delay))`. Cancellation is never
//! retried, and dropping the returned future while it sleeps aborts the retry
//! without running another attempt.

use crate::BridgeError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryPolicyError {
    #[error("max_retries must be greater than 1, got {0}")]
    TooFewRetries(usize),
    #[error("backoff factor must be a finite number >= 1.0, got {0}")]
    InvalidFactor(f64),
}

/// Backoff parameters for [`retry`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_retries: usize,
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), RetryPolicyError> {
        if self.max_retries < 2 {
            return Err(RetryPolicyError::TooFewRetries(self.max_retries));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(RetryPolicyError::InvalidFactor(self.factor));
        }
        Ok(())
    }

    /// Upper bound of the jittered delay preceding retry `attempt`
    pub fn backoff_cap(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }

    /// Uniformly random delay in `[0, backoff_cap(attempt))`
    pub fn jittered_delay(&self, attempt: usize) -> Duration {
        let cap = self.backoff_cap(attempt).as_millis();
        if cap == 0 {
            return Duration::ZERO;
        }
        let cap = u64::try_from(cap).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..cap))
    }
}

/// Errors that can tell a cancellation apart from a failure
pub trait RetryableError {
    fn is_cancellation(&self) -> bool;
}

impl RetryableError for BridgeError {
    fn is_cancellation(&self) -> bool {
        self.is_cancelled()
    }
}

impl RetryableError for anyhow::Error {
    fn is_cancellation(&self) -> bool {
        self.downcast_ref::<BridgeError>()
            .is_some_and(BridgeError::is_cancelled)
    }
}

/// Run `operation` immediately and retry it on failure.
///
/// At most `policy.max_retries` attempts are made. A failure for which
/// `retry_if` returns false, or a cancellation, is returned at once. The final
/// attempt runs unconditionally and its outcome is returned as is.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    retry_if: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    E: RetryableError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts_before_last = policy.max_retries.max(2) - 1;

    for attempt in 0..attempts_before_last {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) if retry_if(&err) => {
                let delay = policy.jittered_delay(attempt);
                debug!(attempt = attempt + 1, ?delay, error = %err, "Attempt failed, backing off");
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => return Err(err),
        }
    }

    operation().await
}

/// Same as [`retry`] with the default policy and every failure retried
pub async fn retry_default<T, E, F, Fut>(operation: F) -> Result<T, E>
where
    E: RetryableError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry(&RetryPolicy::default(), |_| true, operation).await
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
