//! Exponential backoff for retryable remote failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use docrag_core::{EmbeddingServiceError, StoreError};
use tracing::warn;

pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for EmbeddingServiceError {
    fn is_retryable(&self) -> bool { EmbeddingServiceError::is_retryable(self) }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool { StoreError::is_retryable(self) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): the base delay doubled
    /// per attempt, capped at 32x.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(5);
        self.base_delay * (1u32 << exp)
    }

    pub async fn run<T, E, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(operation, attempt, max_retries = self.max_retries, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
