//! Retry utilities for outbound API calls
//!
//! Linear backoff: the wait after attempt `n` is `n * base_delay` plus a small
//! random jitter. Only errors that `ClientError::is_retryable` accepts are
//! repeated.

use crate::config::HttpConfig;
use crate::errors::{ClientError, ClientResult};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to every wait
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryConfig {
    pub fn from_http(config: &HttpConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
            ..Default::default()
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            fastrand::u64(0..=jitter_ms)
        };
        self.base_delay * attempt + Duration::from_millis(jitter)
    }
}

/// Run `operation` until it succeeds, fails with a final error, or the
/// attempts are exhausted. The last error is returned.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
    operation_name: &str,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ClientResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "'{}' succeeded on attempt {}/{}",
                        operation_name, attempt, max_attempts
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_retryable() => {
                debug!("'{}' failed with non-retryable error: {}", operation_name, err);
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                warn!(
                    "'{}' failed after {} attempts: {}",
                    operation_name, max_attempts, err
                );
                return Err(err);
            }
            Err(err) => {
                let delay = config.delay_for(attempt);
                warn!(
                    "'{}' failed on attempt {}/{}, retrying in {:?}: {}",
                    operation_name, attempt, max_attempts, delay, err
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Whether an error returned by [`with_retry`] means the remote rejected our
/// credentials
pub fn is_auth_failure(err: &ClientError) -> bool {
    matches!(err, ClientError::AuthExpired { .. })
        || matches!(err, ClientError::Http { status, .. } if *status == 401 || *status == 403)
}
