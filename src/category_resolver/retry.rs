//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

/// Attempt budget and backoff base.
///
/// The wait after failed attempt `n` (0-based) is `base_delay * 2^n`; there is
/// no wait after the last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Source of waiting, injectable so tests do not sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// All attempts failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetriesExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
///
/// `on_retry(attempt, delay, &error)` is called before each wait, with the
/// 0-based index of the attempt that just failed.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    mut operation: F,
    mut on_retry: impl FnMut(u32, Duration, &E),
) -> Result<T, RetriesExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt + 1 >= max_attempts => {
                return Err(RetriesExhausted {
                    attempts: max_attempts,
                    last_error: error,
                })
            }
            Err(error) => {
                let delay = policy.delay_for(attempt);
                on_retry(attempt, delay, &error);
                clock.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
