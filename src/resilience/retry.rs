use tokio::time::{sleep, Duration};
use tracing::{error, warn};

use crate::config::settings::RetryConfig;
use crate::error::TokenResult;

/// Exponential backoff for callers of the token manager. Only identity
/// provider failures are retried; configuration errors fail immediately.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { attempts: 3, base_delay_ms: 200, max_delay_ms: 1000 }
    }
}

impl From<Option<&RetryConfig>> for RetrySettings {
    fn from(retry: Option<&RetryConfig>) -> Self {
        let defaults = RetrySettings::default();
        Self {
            attempts: retry.and_then(|r| r.attempts).unwrap_or(defaults.attempts).max(1),
            base_delay_ms: retry.and_then(|r| r.base_delay_ms).unwrap_or(defaults.base_delay_ms),
            max_delay_ms: retry.and_then(|r| r.max_delay_ms).unwrap_or(defaults.max_delay_ms),
        }
    }
}

impl RetrySettings {
    pub async fn run_with_retry<F, Fut, T>(&self, mut operation: F) -> TokenResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = TokenResult<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.base_delay_ms;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && e.is_acquisition() => {
                    warn!("Attempt {attempt}/{attempts} failed: {e}");
                    sleep(Duration::from_millis(delay)).await;
                    delay = (delay * 2).min(self.max_delay_ms);
                    attempt += 1;
                }
                Err(e) => {
                    error!("giving up after {attempt} attempt(s): {e}");
                    return Err(e);
                }
            }
        }
    }
}
