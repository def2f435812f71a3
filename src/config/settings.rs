//! Typed engine settings extracted from the merged configuration

use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use super::effective::ConfigError;
use crate::manager::{RetryPolicy, WorkerConfig};

const KNOWN_KEYS: &[&str] = &[
    "lease_seconds",
    "batch_size",
    "max_retries",
    "retry_base_delay_ms",
    "retry_max_delay_ms",
    "poll_interval_ms",
    "max_idle_backoff_ms",
    "log_level",
    "busy_timeout_ms",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub lease_duration: Duration,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub max_idle_backoff: Duration,
    pub log_level: String,
    pub busy_timeout: Duration,
}

impl EngineSettings {
    /// Read and range-check every engine key. Unknown top-level keys are
    /// logged and ignored.
    pub fn from_value(config: &Value) -> Result<Self, ConfigError> {
        let object = config
            .as_object()
            .ok_or_else(|| ConfigError::ValidationError("configuration must be a table".to_string()))?;

        for (key, value) in object {
            if !KNOWN_KEYS.contains(&key.as_str()) && !value.is_object() {
                warn!(key = %key, "ignoring unknown configuration key");
            }
        }

        let lease_seconds = ranged(config, "lease_seconds", 1, 86_400)?;
        let batch_size = ranged(config, "batch_size", 1, 1_000)?;
        let max_retries = ranged(config, "max_retries", 0, 100)?;
        let retry_base_delay_ms = ranged(config, "retry_base_delay_ms", 0, u64::MAX)?;
        let retry_max_delay_ms = ranged(config, "retry_max_delay_ms", 0, u64::MAX)?;
        let poll_interval_ms = ranged(config, "poll_interval_ms", 1, u64::MAX)?;
        let max_idle_backoff_ms = ranged(config, "max_idle_backoff_ms", 1, u64::MAX)?;
        let busy_timeout_ms = ranged(config, "busy_timeout_ms", 0, u64::MAX)?;

        if retry_max_delay_ms < retry_base_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "retry_max_delay_ms ({}) must be >= retry_base_delay_ms ({})",
                retry_max_delay_ms, retry_base_delay_ms
            )));
        }
        if max_idle_backoff_ms < poll_interval_ms {
            return Err(ConfigError::ValidationError(format!(
                "max_idle_backoff_ms ({}) must be >= poll_interval_ms ({})",
                max_idle_backoff_ms, poll_interval_ms
            )));
        }

        let log_level = config
            .get("log_level")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::ValidationError("log_level must be a non-empty string".to_string()))?
            .to_string();

        Ok(Self {
            lease_duration: Duration::from_secs(lease_seconds),
            batch_size: batch_size as usize,
            retry: RetryPolicy::new(
                max_retries as u32,
                Duration::from_millis(retry_base_delay_ms),
                Duration::from_millis(retry_max_delay_ms),
            ),
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_idle_backoff: Duration::from_millis(max_idle_backoff_ms),
            log_level,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: self.poll_interval,
            max_idle_backoff: self.max_idle_backoff,
        }
    }
}

fn ranged(config: &Value, key: &str, min: u64, max: u64) -> Result<u64, ConfigError> {
    let value = config
        .get(key)
        .ok_or_else(|| ConfigError::ValidationError(format!("{} is missing", key)))?;
    let n = value.as_u64().ok_or_else(|| {
        ConfigError::ValidationError(format!("{} must be a non-negative integer, got {}", key, value))
    })?;
    if n < min || n > max {
        return Err(ConfigError::ValidationError(format!(
            "{} must be in {}..={}, got {}",
            key, min, max, n
        )));
    }
    Ok(n)
}
