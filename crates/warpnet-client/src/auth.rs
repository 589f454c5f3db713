//! Client side of platform authentication.
//!
//! warpnet does not issue tickets itself. The platform (or a test double)
//! implements [`ClientAuth`]; the connection asks it for a ticket when the
//! server introduces itself, and cancels that ticket on disconnect so the
//! platform stops vouching for a session that no longer exists.

use warpnet_protocol::PeerIdentity;

/// Platform handle for one issued authentication ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketHandle(pub u32);

/// Issues and cancels authentication tickets for the local player.
///
/// # Example
///
/// ```rust
/// use warpnet_client::{ClientAuth, TicketHandle};
/// use warpnet_protocol::PeerIdentity;
///
/// /// Hands out the player's id as the ticket. Test use only.
/// struct DevAuth {
///     id: PeerIdentity,
///     next: u32,
/// }
///
/// impl ClientAuth for DevAuth {
///     fn local_identity(&self) -> PeerIdentity {
///         self.id
///     }
///
///     fn get_auth_ticket(&mut self) -> (Vec<u8>, TicketHandle) {
///         self.next += 1;
///         (self.id.0.to_be_bytes().to_vec(), TicketHandle(self.next))
///     }
///
///     fn cancel_auth_ticket(&mut self, _handle: TicketHandle) {}
/// }
/// ```
pub trait ClientAuth {
    /// The local player's platform identity.
    fn local_identity(&self) -> PeerIdentity;

    /// Issues a ticket the server can validate, and its handle.
    fn get_auth_ticket(&mut self) -> (Vec<u8>, TicketHandle);

    /// Revokes a ticket returned by [`get_auth_ticket`](Self::get_auth_ticket).
    fn cancel_auth_ticket(&mut self, handle: TicketHandle);
}
