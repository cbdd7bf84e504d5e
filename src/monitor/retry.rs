use crate::monitor::error::MonitorResult;
use std::future::Future;
use tokio::time::{Duration, sleep};
use tracing::warn;

/// Bounded exponential backoff for rate-limited RPC calls.
///
/// Attempt `n` (zero based) waits `base_delay * 2^n` before retrying. Once
/// `max_retries` retries have failed the last error propagates unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_retries,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            max_retries: 5,
        }
    }
}

/// Run `op`, retrying only while it fails with a rate-limit error.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> MonitorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = MonitorResult<T>>,
{
    let mut attempt = 0;

    loop {
        match op().await {
            Err(e) if e.is_rate_limited() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                warn!(
                    "Rate limited on {} - retry {}/{} in {:?}",
                    what, attempt, policy.max_retries, delay
                );
                sleep(delay).await;
            }
            result => return result,
        }
    }
}
