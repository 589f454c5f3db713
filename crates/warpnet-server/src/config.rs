//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warpnet_protocol::{MAX_PLAYERS, MAX_SERVER_NAME};

use crate::ServerError;

/// Tunables for a [`ServerConnection`](crate::ServerConnection).
///
/// All fields default, so a config file only needs what it changes:
///
/// ```rust
/// use warpnet_server::ServerConfig;
///
/// let config: ServerConfig = serde_json::from_str(r#"{"server_name": "Arena"}"#).unwrap();
/// assert_eq!(config.max_players, 4);
/// assert_eq!(config.server_name, "Arena");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Player slots offered. Pending and admitted sessions both count
    /// against it. At most [`MAX_PLAYERS`].
    pub max_players: usize,

    /// A session that sends nothing for this long is kicked.
    pub client_timeout_ms: u64,

    /// Display name sent to every client in `ServerSendInfo`.
    pub server_name: String,

    /// Upper bound on messages drained from the transport per poll.
    pub receive_batch: usize,
}

impl ServerConfig {
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    /// Checks the config against the wire format's limits.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_players == 0 || self.max_players > MAX_PLAYERS {
            return Err(ServerError::InvalidConfig(format!(
                "max_players must be between 1 and {MAX_PLAYERS}, got {}",
                self.max_players
            )));
        }
        // One byte of the field is the NUL terminator.
        if self.server_name.len() >= MAX_SERVER_NAME {
            return Err(ServerError::InvalidConfig(format!(
                "server_name is {} bytes, limit is {}",
                self.server_name.len(),
                MAX_SERVER_NAME - 1
            )));
        }
        if self.receive_batch == 0 {
            return Err(ServerError::InvalidConfig("receive_batch must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_players: MAX_PLAYERS,
            client_timeout_ms: 5_000,
            server_name: "warpnet server".into(),
            receive_batch: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.client_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_zero_players_rejected() {
        let config = ServerConfig {
            max_players: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_too_many_players_rejected() {
        let config = ServerConfig {
            max_players: MAX_PLAYERS + 1,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_long_name_rejected() {
        let fits = ServerConfig {
            server_name: "x".repeat(MAX_SERVER_NAME - 1),
            ..ServerConfig::default()
        };
        assert!(fits.validate().is_ok());

        let too_long = ServerConfig {
            server_name: "x".repeat(MAX_SERVER_NAME),
            ..ServerConfig::default()
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn test_server_config_deserialize_partial() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"max_players": 2, "client_timeout_ms": 100}"#).unwrap();
        assert_eq!(config.max_players, 2);
        assert_eq!(config.client_timeout(), Duration::from_millis(100));
        assert_eq!(config.receive_batch, 128);
    }
}
