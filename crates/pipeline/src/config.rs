//! Tunables of a relay run.
//!
//! Every field has a default so a partial TOML/JSON table is valid.

use std::time::Duration;

use mediarelay_delivery::DeliveryConfig;
use mediarelay_protocol::constants::{
    BIG_FILE_THRESHOLD, BIG_MODE_WORKERS, MAX_ATTEMPTS, MAX_BATCH, MAX_FILE_SIZE, PART_SIZE,
    RELAY_CAPACITY, SMALL_MODE_WORKERS, SPEED_SAMPLE_CAP,
};
use mediarelay_transfer::{RetryPolicy, TrackerConfig, UploaderConfig};
use serde::{Deserialize, Serialize};

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Upload part size in bytes.
    #[serde(default = "default_part_size")]
    pub part_size: usize,

    /// Files strictly larger than this use big-file mode.
    #[serde(default = "default_big_file_threshold")]
    pub big_file_threshold: u64,

    /// Files above this are rejected before transferring.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Relay queue capacity in chunks.
    #[serde(default = "default_relay_capacity")]
    pub relay_capacity: usize,

    #[serde(default = "default_big_mode_workers")]
    pub big_mode_workers: usize,

    #[serde(default = "default_small_mode_workers")]
    pub small_mode_workers: usize,

    /// Attempts per remote call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_rate_limit_margin_ms")]
    pub rate_limit_margin_ms: u64,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    #[serde(default = "default_speed_window_secs")]
    pub speed_window_secs: u64,

    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    #[serde(default = "default_single_pause_ms")]
    pub single_pause_ms: u64,

    #[serde(default = "default_safety_net_cooldown_ms")]
    pub safety_net_cooldown_ms: u64,

    #[serde(default = "default_safety_net_pause_ms")]
    pub safety_net_pause_ms: u64,

    /// Attempts per file, each with a freshly opened source.
    #[serde(default = "default_file_attempts")]
    pub file_attempts: u32,

    #[serde(default = "default_file_retry_pause_ms")]
    pub file_retry_pause_ms: u64,
}

fn default_part_size() -> usize {
    PART_SIZE
}

fn default_big_file_threshold() -> u64 {
    BIG_FILE_THRESHOLD
}

fn default_max_file_size() -> u64 {
    MAX_FILE_SIZE
}

fn default_relay_capacity() -> usize {
    RELAY_CAPACITY
}

fn default_big_mode_workers() -> usize {
    BIG_MODE_WORKERS
}

fn default_small_mode_workers() -> usize {
    SMALL_MODE_WORKERS
}

fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS
}

fn default_rate_limit_margin_ms() -> u64 {
    1000
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_status_interval_ms() -> u64 {
    2500
}

fn default_speed_window_secs() -> u64 {
    8
}

fn default_max_batch() -> usize {
    MAX_BATCH
}

fn default_batch_pause_ms() -> u64 {
    1500
}

fn default_single_pause_ms() -> u64 {
    500
}

fn default_safety_net_cooldown_ms() -> u64 {
    2000
}

fn default_safety_net_pause_ms() -> u64 {
    1000
}

fn default_file_attempts() -> u32 {
    2
}

fn default_file_retry_pause_ms() -> u64 {
    2000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            big_file_threshold: default_big_file_threshold(),
            max_file_size: default_max_file_size(),
            relay_capacity: default_relay_capacity(),
            big_mode_workers: default_big_mode_workers(),
            small_mode_workers: default_small_mode_workers(),
            max_attempts: default_max_attempts(),
            rate_limit_margin_ms: default_rate_limit_margin_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            status_interval_ms: default_status_interval_ms(),
            speed_window_secs: default_speed_window_secs(),
            max_batch: default_max_batch(),
            batch_pause_ms: default_batch_pause_ms(),
            single_pause_ms: default_single_pause_ms(),
            safety_net_cooldown_ms: default_safety_net_cooldown_ms(),
            safety_net_pause_ms: default_safety_net_pause_ms(),
            file_attempts: default_file_attempts(),
            file_retry_pause_ms: default_file_retry_pause_ms(),
        }
    }
}

impl RelayConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            rate_limit_margin: Duration::from_millis(self.rate_limit_margin_ms),
            backoff: Duration::from_millis(self.retry_backoff_ms),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }

    pub fn uploader_config(&self) -> UploaderConfig {
        UploaderConfig {
            part_size: self.part_size.max(1),
            big_file_threshold: self.big_file_threshold,
            big_mode_workers: self.big_mode_workers,
            small_mode_workers: self.small_mode_workers,
            retry: self.retry_policy(),
        }
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            max_batch: self.max_batch.max(1),
            batch_pause: Duration::from_millis(self.batch_pause_ms),
            single_pause: Duration::from_millis(self.single_pause_ms),
            safety_net_cooldown: Duration::from_millis(self.safety_net_cooldown_ms),
            safety_net_pause: Duration::from_millis(self.safety_net_pause_ms),
            retry: self.retry_policy(),
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            interval: Duration::from_millis(self.status_interval_ms.max(1)),
            speed_window: Duration::from_secs(self.speed_window_secs),
            sample_cap: SPEED_SAMPLE_CAP,
            render_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }

    pub fn file_retry_pause(&self) -> Duration {
        Duration::from_millis(self.file_retry_pause_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = RelayConfig::default();
        assert_eq!(config.part_size, 524_288);
        assert_eq!(config.big_file_threshold, 10 * 1024 * 1024);
        assert_eq!(config.relay_capacity, 5);
        assert_eq!(config.file_attempts, 2);

        let retry = config.retry_policy();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.rate_limit_margin, Duration::from_secs(1));
        assert_eq!(retry.call_timeout, Duration::from_secs(60));

        let delivery = config.delivery_config();
        assert_eq!(delivery.max_batch, 8);
        assert_eq!(delivery.batch_pause, Duration::from_millis(1500));
        assert_eq!(delivery.safety_net_cooldown, Duration::from_secs(2));

        assert_eq!(config.tracker_config().interval, Duration::from_millis(2500));
        assert_eq!(config.tracker_config().render_timeout, Duration::from_secs(60));
    }

    #[test]
    fn partial_input_uses_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"max_batch": 4, "file_attempts": 3}"#).unwrap();
        assert_eq!(config.max_batch, 4);
        assert_eq!(config.file_attempts, 3);
        assert_eq!(config.part_size, PART_SIZE);
        assert_eq!(config.single_pause_ms, 500);
    }

    #[test]
    fn empty_input_equals_default() {
        let config: RelayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn zero_values_are_clamped() {
        let config = RelayConfig {
            part_size: 0,
            max_batch: 0,
            max_attempts: 0,
            ..RelayConfig::default()
        };
        assert_eq!(config.uploader_config().part_size, 1);
        assert_eq!(config.delivery_config().max_batch, 1);
        assert_eq!(config.retry_policy().max_attempts, 1);
    }
}
