//! Built-in engine defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDefaults {
    /// Lease duration in seconds (default: 60)
    pub lease_seconds: u64,

    /// Processes leased per manager cycle (default: 10)
    pub batch_size: u64,

    /// Failed attempts before a process is terminated (default: 3)
    pub max_retries: u64,

    /// First retry delay in milliseconds (default: 1000)
    pub retry_base_delay_ms: u64,

    /// Retry delay cap in milliseconds (default: 60000)
    pub retry_max_delay_ms: u64,

    /// Idle sleep between empty cycles in milliseconds (default: 500)
    pub poll_interval_ms: u64,

    /// Cap for the doubling idle sleep in milliseconds (default: 10000)
    pub max_idle_backoff_ms: u64,

    /// tracing filter directive (default: "info")
    pub log_level: String,

    /// SQLite busy timeout in milliseconds (default: 5000)
    pub busy_timeout_ms: u64,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            lease_seconds: 60,
            batch_size: 10,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 60_000,
            poll_interval_ms: 500,
            max_idle_backoff_ms: 10_000,
            log_level: "info".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

impl EngineDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}
