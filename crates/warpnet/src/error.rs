//! Unified error type for the warpnet crates.

use warpnet_client::ClientError;
use warpnet_protocol::ProtocolError;
use warpnet_server::ServerError;
use warpnet_transport::TransportError;

/// Wraps every crate's error so `?` works across layers.
#[derive(Debug, thiserror::Error)]
pub enum WarpnetError {
    /// Encoding or decoding a wire message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Listening, connecting or sending.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Sending through a client connection.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Server setup.
    #[error(transparent)]
    Server(#[from] ServerError),
}

#[cfg(test)]
mod tests {
    use warpnet_protocol::PeerIdentity;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let warpnet_err: WarpnetError = err.into();
        assert!(matches!(warpnet_err, WarpnetError::Transport(_)));
        assert!(warpnet_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownType(77);
        let warpnet_err: WarpnetError = err.into();
        assert!(matches!(warpnet_err, WarpnetError::Protocol(_)));
    }

    #[test]
    fn test_from_client_error() {
        let warpnet_err: WarpnetError = ClientError::NotConnected.into();
        assert!(matches!(warpnet_err, WarpnetError::Client(_)));
    }

    #[test]
    fn test_from_server_error() {
        let err = ServerError::InvalidIdentity(PeerIdentity(0));
        let warpnet_err: WarpnetError = err.into();
        assert!(matches!(warpnet_err, WarpnetError::Server(_)));
    }
}
