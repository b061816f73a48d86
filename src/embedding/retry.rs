//! Bounded retry with exponential backoff
//!
//! Only errors whose [`Retryable::is_retryable`] returns true are retried.
//! Delay for attempt `n` (1-based) is `base * 2^(n-1)`, capped at `max`,
//! with up to ±25% jitter.

use super::{EmbeddingError, EmbeddingProvider};
use crate::config::RetryConfig;
use crate::error::Retryable;
use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry policy shared by provider wrappers
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    enable_jitter: bool,
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
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms.max(config.base_delay_ms),
            enable_jitter: true,
        }
    }

    /// Policy that makes a single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            enable_jitter: false,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.enable_jitter = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent. The last error is returned.
    pub async fn run<T, E, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient failure"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let exponential_delay = self.base_delay_ms.saturating_mul(2u64.pow(exponent));
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.enable_jitter && delay_ms > 0 {
            let jitter = (delay_ms / 4) as f64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter;
            ((delay_ms as f64) + random_jitter).max(0.0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }
}

/// Embedding provider wrapper that retries transient failures
pub struct RetryingEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.policy
            .run("embed_batch", || self.inner.embed_batch(texts))
            .await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
