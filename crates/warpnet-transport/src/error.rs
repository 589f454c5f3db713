use warpnet_protocol::PeerIdentity;

use crate::ConnectionToken;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport has no local identity to connect or send from.
    #[error("transport has no local identity")]
    NoLocalIdentity,

    /// `listen` was called on a transport that is already listening.
    #[error("transport is already listening as {0}")]
    AlreadyListening(PeerIdentity),

    /// No endpoint or address is known for the peer.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerIdentity),

    /// The token does not name a live connection on this transport.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionToken),

    /// The token is of a kind this backing does not issue.
    #[error("token {0} does not belong to this transport")]
    ForeignToken(ConnectionToken),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Binding the listening socket failed.
    #[error("listen failed: {0}")]
    ListenFailed(#[source] std::io::Error),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
