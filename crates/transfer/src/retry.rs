//! Bounded retry around remote calls.

use std::future::Future;
use std::time::Duration;

use mediarelay_protocol::RemoteError;
use mediarelay_protocol::constants::{
    MAX_ATTEMPTS, RATE_LIMIT_MARGIN, REMOTE_CALL_TIMEOUT, RETRY_BACKOFF,
};
use tracing::warn;

/// Attempt budget and delays applied by [`with_retry`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Added on top of a rate-limit hint.
    pub rate_limit_margin: Duration,
    /// Fixed sleep after any other retryable failure.
    pub backoff: Duration,
    /// Per-attempt timeout.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            rate_limit_margin: RATE_LIMIT_MARGIN,
            backoff: RETRY_BACKOFF,
            call_timeout: REMOTE_CALL_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Sleep before the next attempt after `err`.
    pub fn delay_for(&self, err: &RemoteError) -> Duration {
        match err {
            RemoteError::RateLimited { retry_after } => *retry_after + self.rate_limit_margin,
            _ => self.backoff,
        }
    }
}

/// Runs `call` until it succeeds, fails permanently, or the budget runs out.
///
/// Each attempt is bounded by `policy.call_timeout`; a timeout counts as a
/// retryable failure. The last error is returned when attempts are exhausted.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut call: F) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(policy.call_timeout)),
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            warn!(label, attempt, error = %err, "permanent failure, not retrying");
            return Err(err);
        }
        if attempt >= max_attempts {
            warn!(label, attempt, error = %err, "retry budget exhausted");
            return Err(err);
        }

        let delay = policy.delay_for(&err);
        warn!(
            label,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "remote call failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
