//! Bounded exponential-backoff retry for outbound provider calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{LeadScoutError, Result};

/// Retries a call on transient failure.
///
/// Delay before retry `i` (0-based) is `base_delay * 2^i`, capped at `max_delay`.
/// At most `max_attempts` calls are made in total.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay to wait after the `retry_index`-th failure.
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_index);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Non-transient errors are returned as-is after the first failure.
    /// Exhaustion yields [`LeadScoutError::RetriesExhausted`] wrapping the last error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= max => {
                    warn!(operation, attempts = attempt, error = %e, "retries exhausted");
                    return Err(LeadScoutError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt - 1);
                    debug!(operation, attempt, ?delay, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
