//! Retry execution with exponential backoff
//!
//! Wraps a fallible async operation with bounded retry. Only errors that
//! report [`DataError::is_retryable`] are retried; validation, conflict, and
//! constraint failures propagate immediately. After exhaustion the last
//! failure is propagated unchanged, never wrapped.

use campus_core::{DataError, DataResult, RetryPolicy};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Execute an operation with retry per the policy.
///
/// The closure is invoked once per attempt; each invocation must produce a
/// fresh future. The backoff sleep before attempt `i + 1` is
/// `backoff_base * 2^i`, capped at the policy's ceiling.
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> DataResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DataResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Execute an operation with retry and cooperative cancellation.
///
/// The token is honored at every suspension point: before the first attempt,
/// while an attempt is in flight, and during backoff sleeps. A cancelled
/// token yields [`DataError::Cancelled`] immediately instead of finishing
/// the sleep.
pub async fn execute_cancellable<T, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut op: F,
) -> DataResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DataResult<T>>,
{
    if token.is_cancelled() {
        return Err(DataError::Cancelled);
    }

    let mut attempt: u32 = 0;
    loop {
        let result = tokio::select! {
            _ = token.cancelled() => return Err(DataError::Cancelled),
            result = op() => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after backoff"
                );
                tokio::select! {
                    _ = token.cancelled() => return Err(DataError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
