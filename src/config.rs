//! Connection configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```
//! use framewire::ConnectionConfig;
//!
//! let config = ConnectionConfig::from_json(r#"{ "receive_timeout_ms": 500 }"#).unwrap();
//! assert_eq!(config.receive_timeout().as_millis(), 500);
//! assert_eq!(config.read_chunk_size, 2048);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::MAX_FRAME_SIZE;

/// Default receive timeout. Bounds how long the receiver thread can stay
/// blocked in a read after the connection has been closed.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default size of a single socket read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 2048;

/// Default receiver thread name.
pub const DEFAULT_WORKER_NAME: &str = "framewire-recv";

/// Configuration for a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Socket receive timeout in milliseconds. Zero is not allowed by the OS
    /// and is replaced with the default.
    pub receive_timeout_ms: u64,
    /// Optional connect timeout in milliseconds; `None` blocks until the OS
    /// gives up.
    pub connect_timeout_ms: Option<u64>,
    /// Maximum bytes requested per socket read.
    pub read_chunk_size: usize,
    /// Largest declared frame length accepted on receive.
    pub max_frame_size: u32,
    /// Disable Nagle's algorithm on the socket.
    pub nodelay: bool,
    /// Name given to the receiver thread.
    pub worker_name: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT.as_millis() as u64,
            connect_timeout_ms: None,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            nodelay: false,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Parse a configuration from JSON, filling omitted fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Receive timeout as a `Duration`.
    pub fn receive_timeout(&self) -> Duration {
        if self.receive_timeout_ms == 0 {
            DEFAULT_RECEIVE_TIMEOUT
        } else {
            Duration::from_millis(self.receive_timeout_ms)
        }
    }

    /// Connect timeout as a `Duration`, if any.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }

    /// Read chunk size, never zero.
    pub fn read_chunk_size(&self) -> usize {
        self.read_chunk_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.receive_timeout(), Duration::from_secs(2));
        assert_eq!(config.connect_timeout(), None);
        assert_eq!(config.read_chunk_size(), 2048);
        assert_eq!(config.max_frame_size, MAX_FRAME_SIZE);
        assert!(!config.nodelay);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config =
            ConnectionConfig::from_json(r#"{"connect_timeout_ms": 250, "nodelay": true}"#).unwrap();

        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(250)));
        assert!(config.nodelay);
        assert_eq!(config.receive_timeout(), DEFAULT_RECEIVE_TIMEOUT);
        assert_eq!(config.worker_name, DEFAULT_WORKER_NAME);
    }

    #[test]
    fn test_config_zero_values_fall_back() {
        let config = ConnectionConfig {
            receive_timeout_ms: 0,
            connect_timeout_ms: Some(0),
            read_chunk_size: 0,
            ..Default::default()
        };

        assert_eq!(config.receive_timeout(), DEFAULT_RECEIVE_TIMEOUT);
        assert_eq!(config.connect_timeout(), None);
        assert_eq!(config.read_chunk_size(), 1);
    }

    #[test]
    fn test_config_rejects_bad_json() {
        let result = ConnectionConfig::from_json(r#"{"read_chunk_size": "big"}"#);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("JSON error"));
    }
}
