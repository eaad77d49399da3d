//! Bounded retry with exponential backoff.
//!
//! Every call that crosses a process boundary (tool server, completion
//! service) goes through [`with_retry`]:
//!
//! - each attempt is bounded by [`RetryPolicy::timeout`]
//! - transient errors are retried up to [`RetryPolicy::max_attempts`] total
//! - non-transient errors return immediately
//! - delay before attempt `n` (1-based, `n >= 2`) is `base_delay * 2^(n-2)`,
//!   exponent capped at 5: with the default 1s base that is 1s, 2s, 4s, ...

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Errors that know whether another attempt could succeed.
pub trait RetryableError: Sized {
    fn is_transient(&self) -> bool;

    /// Error value for an attempt that exceeded the per-attempt timeout.
    fn timed_out(limit: Duration) -> Self;
}

/// How often and how patiently to retry one boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before the given 0-based attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

/// Run `op` under `policy`. `op` receives the 0-based attempt number.
///
/// # Arguments
///
/// * `policy` - Attempt count, backoff base and per-attempt timeout.
/// * `label` - Name used in the retry log lines, e.g. the tool name.
/// * `op` - Produces a fresh future for each attempt.
///
/// # Errors
///
/// Returns the first non-transient error, or the last error once
/// `max_attempts` is used up. An attempt that outlives `policy.timeout`
/// fails with [`RetryableError::timed_out`].
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: RetryableError + Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = match tokio::time::timeout(policy.timeout, op(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(policy.timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                warn!(
                    call = label,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    error = %e,
                    "transient failure, retrying"
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
