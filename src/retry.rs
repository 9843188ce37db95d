use log::{error, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded exponential backoff for startup work.
///
/// Ingestion writes and enrichment ticks never go through this; they are
/// retried only by the next message or the next tick.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    fn next_delay(&self, delay: Duration) -> Duration {
        let scaled = Duration::from_millis((delay.as_millis() as f64 * self.exponential_base) as u64);
        scaled.min(self.max_delay)
    }
}

/// Execute an async operation with exponential backoff retry
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    warn!(
                        "Operation '{}' succeeded after {} attempts",
                        operation_name, attempt
                    );
                }
                return Ok(result);
            }
            Err(error) if attempt >= config.max_attempts => {
                error!(
                    "Operation '{}' failed after {} attempts. Final error: {}",
                    operation_name, attempt, error
                );
                return Err(error);
            }
            Err(error) => {
                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name, attempt, config.max_attempts, error, delay
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

/// Retry settings for bootstrapping the readings table at startup, while the
/// database container may still be starting.
pub fn bootstrap_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(15),
        exponential_base: 2.0,
    }
}
