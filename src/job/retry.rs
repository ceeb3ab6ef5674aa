//! Bounded retry for a single polling tick.

use crate::config::PollingConfig;
use crate::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times one tick may try, how long to wait in between, and
/// how long a single attempt may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&PollingConfig> for RetryPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: Duration::from_millis(config.retry_delay_ms),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        }
    }
}

/// Result of a retried operation, with the number of attempts used.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-transport error, or
    /// the attempt budget is spent. Each attempt is bounded by
    /// `request_timeout`; a timeout counts as a transport failure.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Attempted<Result<T, ApiError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("{}: attempt {}/{}", label, attempt, max_attempts);

            let result = match tokio::time::timeout(self.request_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ApiError::Timeout(self.request_timeout)),
            };

            match result {
                Ok(value) => {
                    return Attempted {
                        value: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) if e.is_transport() && attempt < max_attempts => {
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label, attempt, max_attempts, e, self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => {
                    return Attempted {
                        value: Err(e),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}
