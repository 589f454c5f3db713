//! Server side of platform authentication.
//!
//! warpnet never validates tickets itself. The platform's auth service
//! (or a test double) implements [`ServerAuth`]. Validation has two
//! phases: [`begin_auth_session`](ServerAuth::begin_auth_session) can
//! reject a ticket on the spot, and the final verdict arrives later
//! through [`poll_results`](ServerAuth::poll_results).
//!
//! Verdicts are keyed by player identity, not by connection, because
//! that is all the platform knows about.

use std::fmt;

use warpnet_protocol::PeerIdentity;

/// Why the auth service refused a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection(pub String);

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The final verdict on one identity's ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSessionResult {
    pub identity: PeerIdentity,
    pub outcome: Result<(), AuthRejection>,
}

/// Validates client tickets against the platform.
///
/// # Example
///
/// ```rust
/// use warpnet_protocol::PeerIdentity;
/// use warpnet_server::{AuthRejection, AuthSessionResult, ServerAuth};
///
/// /// Approves every non-empty ticket on the next poll. Test use only.
/// #[derive(Default)]
/// struct DevAuth {
///     verdicts: Vec<AuthSessionResult>,
/// }
///
/// impl ServerAuth for DevAuth {
///     fn secure(&self) -> bool {
///         false
///     }
///
///     fn begin_auth_session(
///         &mut self,
///         ticket: &[u8],
///         identity: PeerIdentity,
///     ) -> Result<(), AuthRejection> {
///         if ticket.is_empty() {
///             return Err(AuthRejection("empty ticket".into()));
///         }
///         self.verdicts.push(AuthSessionResult { identity, outcome: Ok(()) });
///         Ok(())
///     }
///
///     fn end_auth_session(&mut self, _identity: PeerIdentity) {}
///
///     fn poll_results(&mut self) -> Vec<AuthSessionResult> {
///         std::mem::take(&mut self.verdicts)
///     }
/// }
/// ```
pub trait ServerAuth {
    /// Whether the platform considers this server secure. Advertised to
    /// clients in `ServerSendInfo`.
    fn secure(&self) -> bool;

    /// Submits a ticket. `Err` is an immediate rejection; `Ok` means the
    /// verdict will come from [`poll_results`](Self::poll_results).
    fn begin_auth_session(
        &mut self,
        ticket: &[u8],
        identity: PeerIdentity,
    ) -> Result<(), AuthRejection>;

    /// Tells the platform the identity's session is over.
    fn end_auth_session(&mut self, identity: PeerIdentity);

    /// Drains verdicts reached since the last call.
    fn poll_results(&mut self) -> Vec<AuthSessionResult>;
}
