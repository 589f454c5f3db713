//! In-process loopback transport.
//!
//! A [`LoopbackNet`] is a registry of endpoints keyed by [`PeerIdentity`].
//! Each endpoint owns two FIFO queues: a control queue for connect and
//! disconnect signals, and a data queue for messages. Every
//! [`LoopbackTransport`] built from the same net can reach every other.
//!
//! There is no reliability distinction and no close reason: everything is
//! delivered in order, and a peer that closes is only seen as "closed by
//! peer". A peer that closes and reconnects before the other side polls
//! shows up as the close in one `poll_events` batch and the new
//! connection in the next. Endpoints are allocated and freed explicitly; doing either twice
//! is a bug in the caller and panics.
//!
//! The registry is single-threaded (`Rc<RefCell<_>>`) and lives as long as
//! the nets cloned from it, so separate tests never share endpoints.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use bytes::Bytes;
use warpnet_protocol::{DisconnectReason, PeerIdentity};

use crate::{
    ConnectionState, ConnectionToken, Datagram, SendReliability, Transport,
    TransportError, TransportEvent,
};

// ---------------------------------------------------------------------------
// LoopbackNet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlSignal {
    Connect(PeerIdentity),
    Disconnect(PeerIdentity),
}

#[derive(Debug, Default)]
struct Endpoint {
    listening: bool,
    control: VecDeque<ControlSignal>,
    data: VecDeque<Datagram>,
}

/// Shared registry of loopback endpoints.
///
/// Cloning is cheap and every clone refers to the same registry.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNet {
    endpoints: Rc<RefCell<HashMap<PeerIdentity, Endpoint>>>,
}

impl LoopbackNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the queues for `id`.
    ///
    /// # Panics
    /// If `id` already has an endpoint.
    pub fn allocate_endpoint(&self, id: PeerIdentity) {
        let previous = self.endpoints.borrow_mut().insert(id, Endpoint::default());
        assert!(previous.is_none(), "loopback endpoint {id} allocated twice");
        tracing::debug!(%id, "loopback endpoint allocated");
    }

    /// Drops the queues for `id`, discarding anything still queued.
    ///
    /// # Panics
    /// If `id` has no endpoint.
    pub fn free_endpoint(&self, id: PeerIdentity) {
        let removed = self.endpoints.borrow_mut().remove(&id);
        assert!(removed.is_some(), "loopback endpoint {id} freed twice");
        tracing::debug!(%id, "loopback endpoint freed");
    }

    pub fn is_allocated(&self, id: PeerIdentity) -> bool {
        self.endpoints.borrow().contains_key(&id)
    }

    /// Number of allocated endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.borrow().len()
    }

    fn set_listening(&self, id: PeerIdentity) {
        if let Some(endpoint) = self.endpoints.borrow_mut().get_mut(&id) {
            endpoint.listening = true;
        }
    }

    fn is_listening(&self, id: PeerIdentity) -> bool {
        self.endpoints
            .borrow()
            .get(&id)
            .is_some_and(|endpoint| endpoint.listening)
    }

    /// Queues a control signal. Returns `false` if `to` does not exist.
    fn push_control(&self, to: PeerIdentity, signal: ControlSignal) -> bool {
        match self.endpoints.borrow_mut().get_mut(&to) {
            Some(endpoint) => {
                endpoint.control.push_back(signal);
                true
            }
            None => false,
        }
    }

    fn push_data(&self, to: PeerIdentity, datagram: Datagram) -> bool {
        match self.endpoints.borrow_mut().get_mut(&to) {
            Some(endpoint) => {
                endpoint.data.push_back(datagram);
                true
            }
            None => false,
        }
    }

    /// Pops the next control signal for `id` if `accept` takes it.
    fn pop_control_if(
        &self,
        id: PeerIdentity,
        accept: impl FnOnce(ControlSignal) -> bool,
    ) -> Option<ControlSignal> {
        let mut endpoints = self.endpoints.borrow_mut();
        let control = &mut endpoints.get_mut(&id)?.control;
        let signal = *control.front()?;
        if accept(signal) {
            control.pop_front()
        } else {
            None
        }
    }

    fn discard_data_from(&self, id: PeerIdentity, from: ConnectionToken) {
        if let Some(endpoint) = self.endpoints.borrow_mut().get_mut(&id) {
            endpoint.data.retain(|datagram| datagram.from != from);
        }
    }

    fn drain_data(&self, id: PeerIdentity, max: usize) -> Vec<Datagram> {
        let mut endpoints = self.endpoints.borrow_mut();
        let Some(endpoint) = endpoints.get_mut(&id) else {
            return Vec::new();
        };
        let n = max.min(endpoint.data.len());
        endpoint.data.drain(..n).collect()
    }
}

// ---------------------------------------------------------------------------
// LoopbackTransport
// ---------------------------------------------------------------------------

/// A [`Transport`] whose peers are other endpoints of one [`LoopbackNet`].
///
/// Tokens are always [`ConnectionToken::Identity`]. The local endpoint is
/// allocated lazily by `listen` or the first `connect`, and freed by
/// `shutdown` (or on drop).
#[derive(Debug)]
pub struct LoopbackTransport {
    net: LoopbackNet,
    local: Option<PeerIdentity>,
    allocated: bool,
    listening: bool,
    peers: HashMap<PeerIdentity, ConnectionState>,
    events: Vec<TransportEvent>,
}

impl LoopbackTransport {
    /// A transport that will take its identity from `listen`.
    pub fn new(net: LoopbackNet) -> Self {
        Self {
            net,
            local: None,
            allocated: false,
            listening: false,
            peers: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// A transport that connects out as `local`.
    pub fn with_identity(net: LoopbackNet, local: PeerIdentity) -> Self {
        let mut transport = Self::new(net);
        transport.local = Some(local);
        transport
    }

    pub fn local_identity(&self) -> Option<PeerIdentity> {
        self.local
    }

    /// The state of the connection to `peer`, as far as this side knows.
    pub fn peer_state(&self, peer: PeerIdentity) -> ConnectionState {
        self.peers
            .get(&peer)
            .copied()
            .unwrap_or(ConnectionState::None)
    }

    /// Allocates the local endpoint on first use; later calls reuse it.
    fn ensure_allocated(&mut self) -> Result<PeerIdentity, TransportError> {
        let local = self.local.ok_or(TransportError::NoLocalIdentity)?;
        if !self.allocated {
            self.net.allocate_endpoint(local);
            self.allocated = true;
        }
        Ok(local)
    }

    fn peer_of(token: ConnectionToken) -> Result<PeerIdentity, TransportError> {
        token.identity().ok_or(TransportError::ForeignToken(token))
    }

    fn handle_control(&mut self, signal: ControlSignal) {
        match signal {
            ControlSignal::Connect(from) => {
                if !self.listening {
                    tracing::debug!(%from, "loopback connect while not listening, dropped");
                    return;
                }
                // A repeated connect is still reported; the server decides
                // what a duplicate means.
                self.peers.insert(from, ConnectionState::Connected);
                self.events.push(TransportEvent::Incoming {
                    token: ConnectionToken::Identity(from),
                });
            }
            ControlSignal::Disconnect(from) => {
                let Some(old) = self.peers.remove(&from) else {
                    return;
                };
                self.events.push(TransportEvent::StatusChanged {
                    token: ConnectionToken::Identity(from),
                    old,
                    new: ConnectionState::ClosedByPeer,
                    end_reason: None,
                    detail: "loopback peer disconnected".into(),
                });
            }
        }
    }

    /// Applies queued control signals, stopping short of a reconnect from
    /// a peer whose close is in the same batch. Tokens are per identity,
    /// so the owner has to handle the close before the new connection
    /// exists; the reconnect is picked up by the next poll.
    fn pump_control(&mut self) {
        let Some(local) = self.local.filter(|_| self.allocated) else {
            return;
        };
        let mut closed: Vec<PeerIdentity> = Vec::new();
        while let Some(signal) = self.net.pop_control_if(local, |signal| match signal {
            ControlSignal::Connect(from) => !closed.contains(&from),
            ControlSignal::Disconnect(_) => true,
        }) {
            if let ControlSignal::Disconnect(from) = signal {
                closed.push(from);
            }
            self.handle_control(signal);
        }
    }
}

impl Transport for LoopbackTransport {
    fn listen(&mut self, local: PeerIdentity) -> Result<(), TransportError> {
        if self.listening {
            return Err(TransportError::AlreadyListening(local));
        }
        self.local = Some(local);
        self.ensure_allocated()?;
        self.net.set_listening(local);
        self.listening = true;
        tracing::info!(%local, "loopback transport listening");
        Ok(())
    }

    fn connect(&mut self, remote: PeerIdentity) -> Result<ConnectionToken, TransportError> {
        let local = self.ensure_allocated()?;
        if self.net.is_listening(remote) {
            self.net.push_control(remote, ControlSignal::Connect(local));
        } else {
            // Nobody is there to answer; the caller's timeout handles it.
            tracing::debug!(%local, %remote, "loopback connect to non-listening peer");
        }
        self.peers.insert(remote, ConnectionState::Connecting);
        Ok(ConnectionToken::Identity(remote))
    }

    fn send(
        &mut self,
        to: ConnectionToken,
        data: &[u8],
        _reliability: SendReliability,
    ) -> Result<(), TransportError> {
        let peer = Self::peer_of(to)?;
        let local = self
            .local
            .filter(|_| self.allocated)
            .ok_or(TransportError::NoLocalIdentity)?;
        let datagram = Datagram {
            from: ConnectionToken::Identity(local),
            data: Bytes::copy_from_slice(data),
        };
        if self.net.push_data(peer, datagram) {
            Ok(())
        } else {
            Err(TransportError::UnknownPeer(peer))
        }
    }

    fn receive(&mut self, max: usize) -> Vec<Datagram> {
        let Some(local) = self.local.filter(|_| self.allocated) else {
            return Vec::new();
        };
        let datagrams = self.net.drain_data(local, max);
        for datagram in &datagrams {
            let peer = datagram.from.identity();
            if let Some(state) = peer.and_then(|p| self.peers.get_mut(&p)) {
                if *state == ConnectionState::Connecting {
                    *state = ConnectionState::Connected;
                }
            }
        }
        datagrams
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        self.pump_control();
        std::mem::take(&mut self.events)
    }

    fn close(&mut self, token: ConnectionToken, reason: DisconnectReason, detail: &str) {
        let Some(peer) = token.identity() else {
            return;
        };
        let local = self.local.filter(|_| self.allocated);
        self.events.retain(|event| event.token() != token);
        if let Some(local) = local {
            self.net.discard_data_from(local, token);
        }
        if self.peers.remove(&peer).is_none() {
            return;
        }
        // The loopback carries no reason; it is only logged here.
        tracing::debug!(%peer, %reason, %detail, "loopback close");
        if let Some(local) = local {
            self.net.push_control(peer, ControlSignal::Disconnect(local));
        }
    }

    fn shutdown(&mut self) {
        let peers: Vec<PeerIdentity> = self.peers.keys().copied().collect();
        for peer in peers {
            self.close(
                ConnectionToken::Identity(peer),
                DisconnectReason::ClientDisconnect,
                "transport shutdown",
            );
        }
        if let Some(local) = self.local.filter(|_| self.allocated) {
            self.net.free_endpoint(local);
            self.allocated = false;
        }
        self.listening = false;
        self.events.clear();
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> PeerIdentity {
        PeerIdentity(n)
    }

    #[test]
    fn test_allocate_endpoint_registers_identity() {
        let net = LoopbackNet::new();
        net.allocate_endpoint(id(1));
        assert!(net.is_allocated(id(1)));
        net.free_endpoint(id(1));
        assert!(!net.is_allocated(id(1)));
    }

    #[test]
    #[should_panic(expected = "allocated twice")]
    fn test_allocate_endpoint_twice_panics() {
        let net = LoopbackNet::new();
        net.allocate_endpoint(id(1));
        net.allocate_endpoint(id(1));
    }

    #[test]
    #[should_panic(expected = "freed twice")]
    fn test_free_endpoint_twice_panics() {
        let net = LoopbackNet::new();
        net.allocate_endpoint(id(1));
        net.free_endpoint(id(1));
        net.free_endpoint(id(1));
    }

    #[test]
    fn test_connect_without_identity_fails() {
        let mut transport = LoopbackTransport::new(LoopbackNet::new());
        assert!(matches!(
            transport.connect(id(1)),
            Err(TransportError::NoLocalIdentity)
        ));
    }

    #[test]
    fn test_listen_twice_fails() {
        let mut transport = LoopbackTransport::new(LoopbackNet::new());
        transport.listen(id(1)).unwrap();
        assert!(matches!(
            transport.listen(id(1)),
            Err(TransportError::AlreadyListening(_))
        ));
    }

    #[test]
    fn test_connect_reuses_local_endpoint() {
        let net = LoopbackNet::new();
        let mut client = LoopbackTransport::with_identity(net.clone(), id(2));
        client.connect(id(1)).unwrap();
        client.connect(id(3)).unwrap();
        assert_eq!(net.endpoint_count(), 1);
        assert_eq!(client.peer_state(id(1)), ConnectionState::Connecting);
    }

    #[test]
    fn test_send_with_handle_token_is_rejected() {
        let net = LoopbackNet::new();
        let mut client = LoopbackTransport::with_identity(net, id(2));
        client.connect(id(1)).unwrap();
        let token = ConnectionToken::Handle(crate::ConnectionHandle::new(1));
        assert!(matches!(
            client.send(token, b"x", SendReliability::Reliable),
            Err(TransportError::ForeignToken(_))
        ));
    }

    #[test]
    fn test_drop_frees_endpoint() {
        let net = LoopbackNet::new();
        {
            let mut server = LoopbackTransport::new(net.clone());
            server.listen(id(1)).unwrap();
            assert!(net.is_allocated(id(1)));
        }
        assert_eq!(net.endpoint_count(), 0);
    }
}
