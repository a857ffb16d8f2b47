use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Exponential backoff: `min(initial * multiplier^(attempt-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl BackoffPolicy {
    /// WebSocket reconnects: 1s, doubling, capped at 30s.
    pub const RECONNECT: BackoffPolicy = BackoffPolicy {
        initial_delay: Duration::from_millis(1_000),
        max_delay: Duration::from_millis(30_000),
        multiplier: 2,
    };

    /// Order placement and snapshot fetches: 1s, doubling, capped at 10s.
    pub const REQUEST: BackoffPolicy = BackoffPolicy {
        initial_delay: Duration::from_millis(1_000),
        max_delay: Duration::from_millis(10_000),
        multiplier: 2,
    };

    /// Delay to wait before retry number `attempt` (1-based). Attempt 0 has no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.saturating_pow(attempt - 1);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::REQUEST,
        }
    }
}

/// Final error of a retry sequence together with how many attempts were made.
#[derive(Debug, Clone)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with an error `is_retryable` rejects, or
/// `policy.max_attempts` is reached. Returns the value and the attempt count.
pub async fn retry_with_backoff<T, E, Op, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    mut op: Op,
    is_retryable: P,
) -> Result<(T, u32), RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) => {
                if !is_retryable(&e) {
                    tracing::warn!(label, attempt, error = %e, "Non-retryable failure");
                    return Err(RetryError { error: e, attempts: attempt });
                }
                if attempt >= max_attempts {
                    tracing::error!(label, attempt, error = %e, "Retries exhausted");
                    return Err(RetryError { error: e, attempts: attempt });
                }

                let delay = policy.backoff.delay_for_attempt(attempt);
                metrics::counter!("retries_total", "op" => label.to_string()).increment(1);
                tracing::warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable failure, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
