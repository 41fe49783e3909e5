//! Bounded exponential-backoff retry.
//!
//! Wraps fallible async operations, retrying transient failures with
//! growing, jittered delays and propagating everything else untouched.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Classification hook: which failures are worth retrying.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Retry policy value type. `compute_delay` is pure; jitter is applied
/// separately so the growth curve stays testable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1).
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    /// Uniform ± fraction applied to each computed delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
            jitter: 0.15,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the next try, given the 1-based number of the
    /// attempt that just failed. The first retry waits `initial_delay_ms`;
    /// each subsequent wait grows by `backoff_factor`, capped at
    /// `max_delay_ms`.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let raw = self.initial_delay_ms as f64 * self.backoff_factor.powi(exp as i32);
        Duration::from_millis(raw.min(self.max_delay_ms as f64) as u64)
    }

    /// Apply the ± jitter band to a computed delay.
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        Duration::from_millis((delay.as_millis() as f64 * factor).max(0.0) as u64)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Transient failures persisted through every allowed attempt.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        source: E,
    },
    /// A non-retryable failure, propagated on first occurrence.
    #[error(transparent)]
    Aborted(#[from] E),
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The underlying failure, however it was reached.
    pub fn into_cause(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Aborted(e) => e,
        }
    }
}

/// Run `operation` with up to `policy.max_attempts` tries. Retryable
/// failures sleep through the backoff schedule; everything else aborts
/// immediately.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + Retryable + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(RetryError::Aborted(e)),
            Err(e) => {
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                let delay = policy.jittered(policy.compute_delay(attempt));
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
