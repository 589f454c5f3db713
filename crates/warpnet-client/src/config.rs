//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a [`ClientConnection`](crate::ClientConnection).
///
/// Every field has a default, so a partial document deserializes:
///
/// ```rust
/// use warpnet_client::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str("{}").unwrap();
/// assert_eq!(config.connection_timeout_ms, 30_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long a connection may go without progress (while connecting)
    /// or without inbound data (once connected) before it is dropped.
    pub connection_timeout_ms: u64,
}

impl ClientConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection_timeout_ms: 30_000,
        }
    }
}
