use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::{config::Config, models::retry::RetryConfig};

impl RetryConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            initial_delay_ms: config.initial_retry_delay_ms,
            max_delay_ms: config.max_retry_delay_ms,
            backoff_multiplier: config.retry_backoff_multiplier,
        }
    }
}

pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_backoff_hinted(config, |_| None, operation).await
}

/// Retry with exponential backoff and jitter. When `hint` extracts a delay
/// from the error (a provider `Retry-After` signal), that delay replaces the
/// computed backoff for the next attempt.
pub async fn retry_with_backoff_hinted<F, Fut, T, E, H>(
    config: &RetryConfig,
    hint: H,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    H: Fn(&E) -> Option<Duration>,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts = config.max_attempts,
                        "Retry succeeded"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    warn!(
                        max_attempts = config.max_attempts,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(e);
                }

                let wait = match hint(&e) {
                    Some(hinted) => {
                        debug!(
                            attempt,
                            max_attempts = config.max_attempts,
                            hinted_delay_ms = hinted.as_millis() as u64,
                            "Retry attempt failed, honoring server retry hint"
                        );
                        hinted
                    }
                    None => {
                        debug!(
                            attempt,
                            max_attempts = config.max_attempts,
                            delay_ms,
                            "Retry attempt failed, backing off"
                        );

                        let jitter = rand::random_range(-0.1..=0.1);

                        let jittered_delay = (delay_ms as f64 * (1.0 + jitter)) as u64;
                        Duration::from_millis(jittered_delay)
                    }
                };

                sleep(wait).await;

                delay_ms = std::cmp::min(delay_ms * config.backoff_multiplier, config.max_delay_ms);
            }
        }
    }
}
