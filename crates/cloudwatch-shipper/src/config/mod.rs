//! Runtime configuration for the shipping pipeline.
//!
//! Environment variables, defaults, and validation in one place; the
//! persisted settings surface (log group name + store) lives in [`store`].

use std::env;
use std::time::Duration;

use crate::constants;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

pub mod store;

/// Configuration for one shipping target (a log group/stream pair).
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// Name of the CloudWatch log group.
    pub log_group_name: String,
    /// Name of the log stream within the group.
    pub log_stream_name: String,
    /// AWS region override; `None` uses the environment's default.
    pub region: Option<String>,
    /// Opaque credentials identifier resolved by the credentials
    /// collaborator; `None` uses the default provider chain.
    pub credentials_id: Option<String>,
    /// Interval between periodic flushes, in milliseconds.
    pub flush_interval_ms: u64,
    /// Per-batch serialized payload ceiling in bytes.
    pub max_batch_payload_bytes: usize,
    /// Per-batch event-count ceiling.
    pub max_batch_event_count: usize,
    /// Tolerated producer clock regression in milliseconds.
    pub clock_skew_tolerance_ms: i64,
    /// Buffered-event cap before FIFO eviction.
    pub max_queued_events: usize,
    /// Retry attempts per batch before delivery fails.
    pub max_retry_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling for throttled failures, in milliseconds.
    pub throttle_backoff_cap_ms: u64,
    /// Backoff ceiling for transient failures, in milliseconds.
    pub transient_backoff_cap_ms: u64,
    /// Jitter fraction (0.0–1.0) applied to backoff delays.
    pub retry_jitter_factor: f64,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            log_group_name: String::new(),
            log_stream_name: String::new(),
            region: None,
            credentials_id: None,
            flush_interval_ms: constants::DEFAULT_FLUSH_INTERVAL_MS,
            max_batch_payload_bytes: constants::MAX_BATCH_PAYLOAD_BYTES,
            max_batch_event_count: constants::MAX_BATCH_EVENT_COUNT,
            clock_skew_tolerance_ms: constants::DEFAULT_SKEW_TOLERANCE_MS,
            max_queued_events: constants::MAX_QUEUED_EVENTS,
            max_retry_attempts: retry.max_attempts,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            throttle_backoff_cap_ms: retry.throttle_cap.as_millis() as u64,
            transient_backoff_cap_ms: retry.transient_cap.as_millis() as u64,
            retry_jitter_factor: retry.jitter_factor,
            log_level: "info".to_string(),
        }
    }
}

impl ShipperConfig {
    /// Creates configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ShipperConfig::default();

        let log_group_name = env::var("CWS_LOG_GROUP_NAME").unwrap_or_default();
        let log_stream_name = env::var("CWS_LOG_STREAM_NAME").unwrap_or_default();
        let region = env::var("CWS_REGION")
            .or_else(|_| env::var("AWS_REGION"))
            .ok();
        let credentials_id = env::var("CWS_CREDENTIALS_ID").ok();
        let flush_interval_ms = env::var("CWS_FLUSH_INTERVAL_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(defaults.flush_interval_ms);
        let max_retry_attempts = env::var("CWS_MAX_RETRY_ATTEMPTS")
            .ok()
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(defaults.max_retry_attempts);
        let log_level = env::var("CWS_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level.clone());

        let config = Self {
            log_group_name,
            log_stream_name,
            region,
            credentials_id,
            flush_interval_ms,
            max_retry_attempts,
            log_level,
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_group_name.trim().is_empty() {
            return Err(ConfigError::BlankField("log group name"));
        }
        if self.log_stream_name.trim().is_empty() {
            return Err(ConfigError::BlankField("log stream name"));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "flush interval must be greater than 0".to_string(),
            ));
        }
        if self.max_batch_payload_bytes == 0
            || self.max_batch_payload_bytes > constants::MAX_BATCH_PAYLOAD_BYTES
        {
            return Err(ConfigError::Invalid(format!(
                "batch payload ceiling must be between 1 and {} bytes",
                constants::MAX_BATCH_PAYLOAD_BYTES
            )));
        }
        if self.max_batch_event_count == 0
            || self.max_batch_event_count > constants::MAX_BATCH_EVENT_COUNT
        {
            return Err(ConfigError::Invalid(format!(
                "batch event-count ceiling must be between 1 and {}",
                constants::MAX_BATCH_EVENT_COUNT
            )));
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "at least one delivery attempt is required".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            return Err(ConfigError::Invalid(
                "jitter factor must be between 0.0 and 1.0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Backoff policy derived from the retry knobs.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            throttle_cap: Duration::from_millis(self.throttle_backoff_cap_ms),
            transient_cap: Duration::from_millis(self.transient_backoff_cap_ms),
            jitter_factor: self.retry_jitter_factor,
        }
    }
}
