//! Retry with exponential backoff for throttled backend calls.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry settings shared by the adapters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (0 = no retries, run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff_base_ms: 200,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at [`MAX_BACKOFF`].
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u64
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
    }
}

/// Why a retried call gave up.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Still throttled after every attempt.
    Throttled { attempts: u32 },
    /// A non-retryable error; returned immediately.
    Failed(E),
}

/// Run `op`, retrying while `is_throttled` says the error is a rate limit.
///
/// Backoff doubles from `backoff_base_ms`. Any other error is returned
/// without retrying.
pub async fn with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_throttled: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_retries.saturating_add(1);
    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_throttled(&err) => {
                if attempt == max_attempts {
                    break;
                }
                let delay = policy.delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "throttled; backing off");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(RetryError::Failed(err)),
        }
    }
    Err(RetryError::Throttled {
        attempts: max_attempts,
    })
}
