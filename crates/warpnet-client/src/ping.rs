//! Resolving a server address to its identity.
//!
//! Connecting by raw IP needs one extra step: the server's identity has to
//! be looked up first. A [`ServerPinger`] does that asynchronously. Every
//! ping carries a [`PingGeneration`]; the connection bumps its generation
//! on teardown, so a result that arrives late is recognized as stale and
//! ignored instead of reviving a connection that no longer exists.

use std::net::IpAddr;

use warpnet_protocol::PeerIdentity;

/// Epoch tag for one ping request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PingGeneration(u64);

impl PingGeneration {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// The outcome of one ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResult {
    pub generation: PingGeneration,
    /// The server's identity, or why it could not be reached.
    pub outcome: Result<PeerIdentity, String>,
}

/// Looks up the identity of the server at an address.
pub trait ServerPinger {
    /// Starts a lookup. The result is reported by a later
    /// [`poll_results`](Self::poll_results) tagged with `generation`.
    fn ping(&mut self, addr: IpAddr, port: u16, generation: PingGeneration);

    /// Abandons the lookup started with `generation`, if still running.
    fn cancel(&mut self, generation: PingGeneration);

    /// Drains finished lookups.
    fn poll_results(&mut self) -> Vec<PingResult>;
}

/// A pinger for clients that only ever connect by identity. Every ping
/// fails on the next poll.
#[derive(Debug, Default)]
pub struct NullPinger {
    failed: Vec<PingResult>,
}

impl ServerPinger for NullPinger {
    fn ping(&mut self, addr: IpAddr, port: u16, generation: PingGeneration) {
        self.failed.push(PingResult {
            generation,
            outcome: Err(format!("cannot look up server at {addr}:{port}")),
        });
    }

    fn cancel(&mut self, generation: PingGeneration) {
        self.failed.retain(|r| r.generation != generation);
    }

    fn poll_results(&mut self) -> Vec<PingResult> {
        std::mem::take(&mut self.failed)
    }
}
