use warpnet_protocol::{PeerIdentity, ProtocolError};
use warpnet_transport::TransportError;

/// Errors from setting up or driving a [`ServerConnection`](crate::ServerConnection).
///
/// Per-client failures (bad messages, rejected tickets, timeouts) are not
/// errors at this level. They end that client's session and are logged.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configuration cannot be served.
    #[error("invalid server config: {0}")]
    InvalidConfig(String),

    /// The reserved "no identity" value was offered as the server identity.
    #[error("{0} is not a valid server identity")]
    InvalidIdentity(PeerIdentity),

    /// `set_identity` was called a second time.
    #[error("server identity already set to {0}")]
    IdentityAlreadySet(PeerIdentity),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
