//! Retry with exponential backoff for remote source requests

use std::time::Duration;

use crate::application::errors::TransportError;

/// Retry configuration for exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before the retry following `delay`
    pub fn next_delay(&self, delay: Duration) -> Duration {
        std::cmp::min(
            Duration::from_millis((delay.as_millis() as f64 * self.backoff_multiplier) as u64),
            self.max_delay,
        )
    }
}

/// Execute an operation with exponential backoff retry logic
///
/// The retry loop knows nothing about any outer deadline. Callers that need
/// one race the returned future against their own timer.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempts >= config.max_attempts || !error.is_retryable() {
                    return Err(error);
                }

                tracing::debug!(
                    attempt = attempts,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Retrying request with exponential backoff"
                );

                tokio::time::sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

/// Errors that may succeed when the same request is sent again
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } | TransportError::Http { .. } => true,
            TransportError::InvalidUrl { .. } => false,
        }
    }
}

impl Retryable for crate::application::errors::FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Parse(_) | Self::Incomplete { .. } => false,
        }
    }
}
