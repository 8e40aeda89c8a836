//! Bounded retry with exponential backoff, shared by the AI gateway and the
//! resume-document persistence path.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// 2 doubles the delay after every failure; 1 keeps it constant.
    pub multiplier: u32,
}

impl BackoffPolicy {
    /// 3 attempts, 1s then 2s between them (4s would follow a fourth).
    pub const fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier: 2,
        }
    }

    pub const fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            multiplier: 1,
        }
    }

    /// Delay to wait after the failed attempt with 0-based index `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(self.multiplier.saturating_pow(attempt))
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    Exhausted { last_error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Runs `op` until it succeeds or `policy.max_attempts` is spent.
/// `op` receives the 0-based attempt index.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    label: &str,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome::Success {
                    value,
                    attempts: attempt + 1,
                }
            }
            Err(e) if attempt + 1 >= max_attempts => {
                warn!("{label} failed after {max_attempts} attempts: {e}");
                return RetryOutcome::Exhausted {
                    last_error: e,
                    attempts: attempt + 1,
                };
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{label} attempt {}/{} failed: {e}; retrying after {}ms",
                    attempt + 1,
                    max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
