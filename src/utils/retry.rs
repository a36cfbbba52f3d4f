//! Backoff for requests to the embedding server.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::models::EmbeddingConfig;

/// Whether a failed request may succeed when sent again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Attempt budget and doubling delays for one embedding batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Total attempts, at least one
    pub attempts: u32,
    pub first_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            attempts: config.max_retries.max(1),
            first_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(config.timeout_secs.clamp(1, 10)),
        }
    }

    /// Wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.first_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `request` until it succeeds, fails permanently or the attempts run out.
    pub async fn run<T, E, F, Fut>(&self, mut request: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && e.is_retryable() => {
                    let wait = self.delay_after(attempt);
                    tracing::debug!(
                        target: "embedding",
                        "attempt {attempt}/{} failed: {e}; retrying in {wait:?}",
                        self.attempts
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
