use crate::config::RetryPolicy;
use crate::error::{AppError, Result};
use std::future::Future;
use std::time::Duration;

/// Bound a single store call by the policy's timeout.
pub async fn bounded<T, F>(policy: &RetryPolicy, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(policy.timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(AppError::Timeout(policy.timeout.as_millis() as u64)),
    }
}

/// Idempotent reads: each attempt is bounded, transport failures back off
/// exponentially and try again.
pub async fn read<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut delay = policy.base_delay;
    let mut attempt = 1;
    loop {
        match bounded(policy, op()).await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    what,
                    attempt,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, policy.max_delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Writes are attempted once; the caller surfaces the failure.
pub async fn write<T, F>(policy: &RetryPolicy, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let res = bounded(policy, fut).await;
    if let Err(e) = &res {
        tracing::error!("{} failed: {}", what, e);
    }
    res
}

fn next_delay(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
