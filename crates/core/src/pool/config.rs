//! Pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::PoolError;

/// Tuning for a solving session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Capacity of each result channel.
    /// Workers block when the consumer falls this far behind.
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,

    /// Delay between polls of a pending task (milliseconds).
    /// Also used as the delay before the first poll.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Backoff applied to the shared gate when the service has no free
    /// solving slot (milliseconds).
    #[serde(default = "default_no_slot_backoff")]
    pub no_slot_backoff_ms: u64,

    /// Delay before retrying a request that failed in transport (milliseconds).
    #[serde(default = "default_transport_retry")]
    pub transport_retry_ms: u64,

    /// Publish failed tasks to the error channel.
    /// When disabled the error channel is closed from the start.
    #[serde(default = "default_report_errors")]
    pub report_errors: bool,

    /// Cancel the session once this many tasks have failed (None = never).
    #[serde(default)]
    pub max_task_failures: Option<u64>,
}

fn default_threads() -> usize {
    1
}

fn default_capacity() -> usize {
    100
}

fn default_poll_interval() -> u64 {
    5000 // 5 seconds
}

fn default_no_slot_backoff() -> u64 {
    5000 // 5 seconds
}

fn default_transport_retry() -> u64 {
    1000 // 1 second
}

fn default_report_errors() -> bool {
    true
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            channel_capacity: default_capacity(),
            poll_interval_ms: default_poll_interval(),
            no_slot_backoff_ms: default_no_slot_backoff(),
            transport_retry_ms: default_transport_retry(),
            report_errors: default_report_errors(),
            max_task_failures: None,
        }
    }
}

impl PoolConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn no_slot_backoff(&self) -> Duration {
        Duration::from_millis(self.no_slot_backoff_ms)
    }

    pub fn transport_retry(&self) -> Duration {
        Duration::from_millis(self.transport_retry_ms)
    }

    /// Reject settings the pool cannot run with.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.threads == 0 {
            return Err(PoolError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "poll_interval_ms cannot be 0".to_string(),
            ));
        }
        if self.transport_retry_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "transport_retry_ms cannot be 0".to_string(),
            ));
        }
        if self.max_task_failures == Some(0) {
            return Err(PoolError::InvalidConfig(
                "max_task_failures cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}
