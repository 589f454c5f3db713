use warpnet_protocol::ProtocolError;
use warpnet_transport::TransportError;

/// Errors returned to the game when it sends through the client.
///
/// Connection failures never show up here: they end the connection and
/// leave a reason in [`ClientConnection::last_error`](crate::ClientConnection::last_error).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// There is no open connection to send on.
    #[error("not connected to a server")]
    NotConnected,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
