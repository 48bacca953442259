//! Per-batch timeout and bounded retry.
//!
//! Every store call made on behalf of a running job goes through
//! [`with_retry`]. Batches are idempotent at the row-matching level, so
//! re-running one that timed out mid-flight has no double effect.

use std::future::Future;
use std::time::Duration;

use catalog_core::config::EngineConfig;
use catalog_core::error::StoreError;
use catalog_core::types::DbId;

/// Timeout and attempt budget for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    /// Linear backoff unit: attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.batch_max_attempts.max(1),
            timeout: config.batch_timeout,
            backoff: config.retry_backoff,
        }
    }

    /// Budget for writing a job's terminal snapshot: same timeout and
    /// backoff, more attempts.
    pub fn for_terminal(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.finish_max_attempts.max(config.batch_max_attempts).max(1),
            ..Self::from_config(config)
        }
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. Each attempt is bounded by `policy.timeout`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    job_id: DbId,
    operation: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(policy.timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    job_id,
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Batch attempt failed, retrying",
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
