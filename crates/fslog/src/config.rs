//! Configuration for a log handle

use std::time::Duration;

use fslog_core::Delimiter;
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Configuration for an [`FsLog`](crate::FsLog)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Record terminator; readers and writers of one file must agree on it
    pub delimiter: Delimiter,
    /// Whether to sync file data to disk after every append
    pub sync_on_write: bool,
    /// Bytes requested per read while scanning
    pub read_buffer_size: usize,
    /// How often a tailing scan re-checks the file for growth
    pub tail_poll_interval_ms: u64,
    /// Records buffered between a scan's reader task and its consumer
    pub scan_channel_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::default(),
            sync_on_write: false,
            read_buffer_size: 64 * 1024,
            tail_poll_interval_ms: 100,
            scan_channel_capacity: 16,
        }
    }
}

impl LogConfig {
    /// Sync every append to disk before acknowledging it
    pub fn durable() -> Self {
        Self {
            sync_on_write: true,
            ..Default::default()
        }
    }

    /// Small buffers and a fast poll, for tests
    pub fn testing() -> Self {
        Self {
            read_buffer_size: 64,
            tail_poll_interval_ms: 10,
            scan_channel_capacity: 4,
            ..Default::default()
        }
    }

    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_tail_poll_interval(mut self, interval: Duration) -> Self {
        self.tail_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_scan_channel_capacity(mut self, capacity: usize) -> Self {
        self.scan_channel_capacity = capacity;
        self
    }

    pub fn tail_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tail_poll_interval_ms.max(1))
    }

    /// Check values a handle cannot work with
    pub fn validate(&self) -> Result<(), LogError> {
        if self.delimiter.is_empty() {
            return Err(LogError::InvalidConfig("delimiter must not be empty".into()));
        }
        if self.read_buffer_size == 0 {
            return Err(LogError::InvalidConfig(
                "read_buffer_size must be greater than zero".into(),
            ));
        }
        if self.scan_channel_capacity == 0 {
            return Err(LogError::InvalidConfig(
                "scan_channel_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LogConfig::default();
        assert_eq!(config.delimiter.as_bytes(), b"\r\n");
        assert!(!config.sync_on_write);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert!(LogConfig::durable().sync_on_write);
        assert_eq!(
            LogConfig::testing().tail_poll_interval(),
            Duration::from_millis(10)
        );
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let config = LogConfig::default().with_read_buffer_size(0);
        assert!(matches!(config.validate(), Err(LogError::InvalidConfig(_))));

        let config = LogConfig::default().with_scan_channel_capacity(0);
        assert!(matches!(config.validate(), Err(LogError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_config_from_json() {
        let config: LogConfig =
            serde_json::from_str(r#"{"delimiter": "\n", "sync_on_write": true}"#).unwrap();
        assert_eq!(config.delimiter.as_bytes(), b"\n");
        assert!(config.sync_on_write);
        assert_eq!(config.read_buffer_size, 64 * 1024);
    }

    #[test]
    fn test_empty_delimiter_in_json_rejected() {
        let result = serde_json::from_str::<LogConfig>(r#"{"delimiter": ""}"#);
        assert!(result.is_err());
    }
}
