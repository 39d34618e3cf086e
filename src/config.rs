use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryConfig;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub queue_url: String,

    pub redis_url: String,

    pub routing_plan_id: String,

    /// Base URL of the delivery provider. Required for live dispatch only.
    pub provider_base_url: Option<String>,
    pub provider_api_key: Option<String>,
    pub provider_private_key: Option<String>,
    pub provider_key_id: Option<String>,

    /// Postgres audit trail. Skipped entirely when unset.
    pub database_url: Option<String>,

    /// When true, no real provider requests are made; successes are
    /// fabricated after a short delay.
    #[serde(default = "default_silent_running")]
    pub silent_running: bool,

    #[serde(default = "default_receive_wait_seconds")]
    pub receive_wait_seconds: u64,
    #[serde(default = "default_max_drain_messages")]
    pub max_drain_messages: usize,
    #[serde(default = "default_min_batch_threshold")]
    pub min_batch_threshold: usize,

    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: i64,
    #[serde(default = "default_state_ttl_seconds")]
    pub state_ttl_seconds: i64,

    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    #[serde(default = "default_dispatch_timeout_seconds")]
    pub dispatch_timeout_seconds: u64,
    #[serde(default = "default_max_runtime_seconds")]
    pub max_runtime_seconds: u64,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}

fn default_silent_running() -> bool {
    true
}

fn default_receive_wait_seconds() -> u64 {
    20
}

fn default_max_drain_messages() -> usize {
    100
}

fn default_min_batch_threshold() -> usize {
    5
}

fn default_cooldown_seconds() -> i64 {
    900
}

fn default_state_ttl_seconds() -> i64 {
    // Keep records for 2 weeks
    60 * 60 * 24 * 14
}

fn default_max_batch_items() -> usize {
    45_000
}

fn default_max_batch_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_dispatch_timeout_seconds() -> u64 {
    30
}

fn default_max_runtime_seconds() -> u64 {
    840
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}
