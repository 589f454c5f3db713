//! The client's connection state machine.
//!
//! A client has at most one connection, to one server. It moves through:
//!
//! ```text
//! NotConnected → PingingServer → ConnectingP2P → ConnectedPendingAuthentication → ConnectedAndAuthenticated
//!             └──────────────→ ConnectingP2P (connect by identity)
//! ```
//!
//! and returns to `NotConnected` from any state through
//! [`ClientConnection::disconnect`]. Nothing here blocks: the game calls
//! [`ClientConnection::poll`] and [`ClientConnection::test_liveness_timeout`]
//! every frame, and all progress is made inside those calls.
//!
//! After any disconnect, [`ClientConnection::last_error`] holds a
//! human-readable reason. The first reason of a connection attempt wins;
//! it is cleared when the next attempt starts.

use std::net::IpAddr;
use std::time::Instant;

use warpnet_protocol::{
    ClientBeginAuthentication, DisconnectReason, Message, PeerIdentity,
};
use warpnet_transport::{
    reason_from_close_code, ConnectionState, ConnectionToken, SendReliability,
    Transport, TransportEvent,
};

use crate::auth::{ClientAuth, TicketHandle};
use crate::ping::{PingGeneration, PingResult, ServerPinger};
use crate::{ClientConfig, ClientError};

/// Upper bound on messages drained per [`ClientConnection::poll`].
const RECEIVE_BATCH: usize = 32;

const TIMED_OUT_CONNECTING: &str = "Timed out connecting to server.";
const FAILED_TO_CONNECT: &str = "Failed to connect to server.";
const CONNECTION_LOST: &str = "Game server connection failure.";
const SERVER_EXITED: &str = "Server has exited.";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where the client is in the connect/authenticate sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    NotConnected,
    /// Waiting for an address lookup to produce the server identity.
    PingingServer,
    /// Transport connect issued; waiting for the server to introduce itself.
    ConnectingP2P,
    /// Ticket sent; waiting for the server's verdict.
    ConnectedPendingAuthentication,
    ConnectedAndAuthenticated,
}

/// What the client learned from `ServerSendInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub identity: PeerIdentity,
    pub name: String,
    pub secure: bool,
}

/// Result of [`ClientConnection::handle_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    /// A control message the connection fully handled.
    Consumed,
    /// Handled, and the game should see it too (`ServerPassAuthentication`).
    ConsumedAndForward,
    /// Not a control message; it belongs to the game.
    NotHandled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectTarget {
    Identity(PeerIdentity),
    Address(IpAddr, u16),
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// One client's connection to a game server.
///
/// Generic over its collaborators so the same state machine runs against
/// the loopback or a real transport, and real or fake platform services.
pub struct ClientConnection<T, A, P> {
    config: ClientConfig,
    transport: T,
    auth: A,
    pinger: P,
    state: ClientState,
    target: Option<ConnectTarget>,
    token: Option<ConnectionToken>,
    server: Option<ServerInfo>,
    slot: Option<u32>,
    started_at: Option<Instant>,
    last_received: Option<Instant>,
    ticket: Option<TicketHandle>,
    ping_generation: PingGeneration,
    last_error: Option<String>,
}

impl<T, A, P> ClientConnection<T, A, P>
where
    T: Transport,
    A: ClientAuth,
    P: ServerPinger,
{
    pub fn new(config: ClientConfig, transport: T, auth: A, pinger: P) -> Self {
        Self {
            config,
            transport,
            auth,
            pinger,
            state: ClientState::NotConnected,
            target: None,
            token: None,
            server: None,
            slot: None,
            started_at: None,
            last_received: None,
            ticket: None,
            ping_generation: PingGeneration::default(),
            last_error: None,
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Why the last connection attempt ended, if it did.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    /// The player slot assigned by the server, once authenticated.
    pub fn slot(&self) -> Option<u32> {
        self.slot
    }

    pub fn token(&self) -> Option<ConnectionToken> {
        self.token
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn pinger(&self) -> &P {
        &self.pinger
    }

    pub fn pinger_mut(&mut self) -> &mut P {
        &mut self.pinger
    }

    // -- connecting ---------------------------------------------------------

    /// Starts connecting to the server with identity `server`.
    ///
    /// # Panics
    /// Unless the client is `NotConnected` or `PingingServer`.
    pub fn connect(&mut self, server: PeerIdentity, now: Instant) {
        assert!(
            matches!(
                self.state,
                ClientState::NotConnected | ClientState::PingingServer
            ),
            "connect called while {:?}",
            self.state
        );

        if self.state == ClientState::NotConnected {
            self.last_error = None;
        }
        self.target = Some(ConnectTarget::Identity(server));
        self.started_at = Some(now);
        self.last_received = None;

        match self.transport.connect(server) {
            Ok(token) => {
                tracing::info!(%server, %token, "connecting to server");
                self.token = Some(token);
                self.state = ClientState::ConnectingP2P;
            }
            Err(e) => {
                tracing::error!(%server, error = %e, "transport connect failed");
                self.disconnect(&format!("Failed to connect to server: {e}"));
            }
        }
    }

    /// Starts connecting to the server listening at `addr:port`. The
    /// server's identity is looked up first through the pinger.
    ///
    /// # Panics
    /// Unless the client is `NotConnected`.
    pub fn connect_by_address(&mut self, addr: IpAddr, port: u16, now: Instant) {
        assert_eq!(
            self.state,
            ClientState::NotConnected,
            "connect_by_address called while connected"
        );

        self.last_error = None;
        self.target = Some(ConnectTarget::Address(addr, port));
        self.started_at = Some(now);
        self.ping_generation = self.ping_generation.next();
        self.state = ClientState::PingingServer;

        tracing::info!(%addr, port, "looking up server");
        self.pinger.ping(addr, port, self.ping_generation);
    }

    /// Applies the outcome of an address lookup.
    ///
    /// A result from a generation other than the current one belongs to a
    /// lookup this client already abandoned and is ignored.
    pub fn on_ping_result(&mut self, result: PingResult, now: Instant) {
        if result.generation != self.ping_generation
            || self.state != ClientState::PingingServer
        {
            tracing::debug!(generation = ?result.generation, "stale ping result ignored");
            return;
        }
        match result.outcome {
            Ok(server) => self.connect(server, now),
            Err(reason) => {
                tracing::warn!(%reason, "server lookup failed");
                self.disconnect(&format!("Failed to find server: {reason}"));
            }
        }
    }

    // -- per-frame ----------------------------------------------------------

    /// Processes transport events, lookup results and inbound data.
    ///
    /// Returns the messages the game should act on: everything that is
    /// not a connection control message, plus `ServerPassAuthentication`.
    /// Game traffic that arrives before authentication completes is
    /// dropped.
    pub fn poll(&mut self, now: Instant) -> Vec<Message> {
        let for_game = self.receive_messages(now);
        for event in self.transport.poll_events() {
            self.on_transport_event(event);
        }
        for result in self.pinger.poll_results() {
            self.on_ping_result(result, now);
        }
        for_game
    }

    /// Data is drained ahead of status events so a server's final message
    /// (an auth failure, `ServerExiting`) is seen before its close.
    fn receive_messages(&mut self, now: Instant) -> Vec<Message> {
        let mut for_game = Vec::new();
        for datagram in self.transport.receive(RECEIVE_BATCH) {
            if Some(datagram.from) != self.token {
                tracing::debug!(from = %datagram.from, "data from unknown connection dropped");
                continue;
            }
            self.last_received = Some(now);

            let msg = match Message::decode(&datagram.data) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable message from server dropped");
                    continue;
                }
            };

            match self.handle_message(&msg) {
                MessageDisposition::Consumed => {}
                MessageDisposition::ConsumedAndForward => for_game.push(msg),
                MessageDisposition::NotHandled
                    if self.state == ClientState::ConnectedAndAuthenticated =>
                {
                    for_game.push(msg);
                }
                MessageDisposition::NotHandled => {
                    tracing::warn!(
                        message = %msg.message_type(),
                        state = ?self.state,
                        "server message before authentication dropped"
                    );
                }
            }
        }
        for_game
    }

    /// Handles a connection control message from the server.
    ///
    /// # Panics
    /// On `ServerSendInfo` outside `ConnectingP2P`: the server only sends
    /// it once, right after accepting the connection.
    pub fn handle_message(&mut self, msg: &Message) -> MessageDisposition {
        match msg {
            Message::ServerSendInfo(info) => {
                assert_eq!(
                    self.state,
                    ClientState::ConnectingP2P,
                    "ServerSendInfo received outside ConnectingP2P"
                );
                tracing::info!(
                    server = %info.server_identity,
                    name = %info.server_name,
                    secure = info.secure,
                    "server info received, authenticating"
                );
                self.server = Some(ServerInfo {
                    identity: info.server_identity,
                    name: info.server_name.clone(),
                    secure: info.secure,
                });
                self.state = ClientState::ConnectedPendingAuthentication;
                self.begin_authentication();
                MessageDisposition::Consumed
            }
            Message::ServerPassAuthentication(pass) => {
                if self.state != ClientState::ConnectedPendingAuthentication {
                    tracing::warn!(state = ?self.state, "unexpected ServerPassAuthentication dropped");
                    return MessageDisposition::Consumed;
                }
                tracing::info!(slot = pass.slot, "authenticated with server");
                self.slot = Some(pass.slot);
                self.state = ClientState::ConnectedAndAuthenticated;
                MessageDisposition::ConsumedAndForward
            }
            Message::ServerFailAuthentication => {
                self.disconnect(DisconnectReason::ServerRejectedAuth.describe());
                MessageDisposition::Consumed
            }
            Message::ServerExiting => {
                self.disconnect(SERVER_EXITED);
                MessageDisposition::Consumed
            }
            _ => MessageDisposition::NotHandled,
        }
    }

    fn begin_authentication(&mut self) {
        let (ticket, handle) = self.auth.get_auth_ticket();
        self.ticket = Some(handle);
        let begin = Message::ClientBeginAuthentication(ClientBeginAuthentication {
            ticket,
            sender: Some(self.auth.local_identity()),
        });
        if let Err(e) = self.send_message(&begin, SendReliability::Reliable) {
            tracing::error!(error = %e, "failed to send authentication ticket");
            self.disconnect(CONNECTION_LOST);
        }
    }

    /// Reacts to a transport state change on the client's connection.
    ///
    /// # Panics
    /// If the event names a connection this client does not own.
    pub fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Incoming { token } => {
                tracing::warn!(%token, "client transport reported an inbound connection, ignored");
            }
            TransportEvent::StatusChanged {
                token,
                old,
                new,
                end_reason,
                detail,
            } => {
                assert_eq!(
                    Some(token),
                    self.token,
                    "status change for a connection this client does not own"
                );
                let was_open = matches!(old, ConnectionState::Connecting | ConnectionState::Connected);
                if !(was_open && new.is_closed()) {
                    tracing::debug!(%token, ?old, ?new, "connection status changed");
                    return;
                }

                tracing::info!(%token, ?new, ?end_reason, %detail, "connection closed");
                let reason = match end_reason.and_then(reason_from_close_code) {
                    Some(reason) => reason.describe(),
                    None if self.state == ClientState::ConnectingP2P => FAILED_TO_CONNECT,
                    None => CONNECTION_LOST,
                };
                self.disconnect(reason);
            }
        }
    }

    /// Disconnects if nothing has happened for longer than the configured
    /// timeout. Returns `true` if it disconnected.
    ///
    /// While connecting the clock starts at the attempt; once the server
    /// has spoken it restarts with every message received.
    pub fn test_liveness_timeout(&mut self, now: Instant) -> bool {
        let (since, reason) = match self.state {
            ClientState::NotConnected => return false,
            ClientState::PingingServer | ClientState::ConnectingP2P => {
                (self.started_at, TIMED_OUT_CONNECTING)
            }
            ClientState::ConnectedPendingAuthentication
            | ClientState::ConnectedAndAuthenticated => {
                (self.last_received.or(self.started_at), CONNECTION_LOST)
            }
        };
        let Some(since) = since else {
            return false;
        };
        if now.saturating_duration_since(since) > self.config.connection_timeout() {
            tracing::warn!(state = ?self.state, "connection timed out");
            self.disconnect(reason);
            return true;
        }
        false
    }

    // -- sending ------------------------------------------------------------

    /// Encodes and sends `msg` to the server.
    pub fn send_message(
        &mut self,
        msg: &Message,
        reliability: SendReliability,
    ) -> Result<(), ClientError> {
        let token = self.token.ok_or(ClientError::NotConnected)?;
        let bytes = msg.encode()?;
        self.transport.send(token, &bytes, reliability)?;
        Ok(())
    }

    // -- teardown -----------------------------------------------------------

    /// Tears the connection down and returns to `NotConnected`.
    ///
    /// Safe to call in any state and more than once: outstanding lookups
    /// and tickets are cancelled once, the transport connection is closed
    /// once, and only the first reason of an attempt is kept.
    pub fn disconnect(&mut self, reason: &str) {
        if self.state == ClientState::PingingServer {
            self.pinger.cancel(self.ping_generation);
        }
        // Any lookup still in flight is now stale.
        self.ping_generation = self.ping_generation.next();

        if let Some(handle) = self.ticket.take() {
            self.auth.cancel_auth_ticket(handle);
        }
        if let Some(token) = self.token.take() {
            self.transport
                .close(token, DisconnectReason::ClientDisconnect, reason);
        }
        if self.last_error.is_none() {
            self.last_error = Some(reason.to_owned());
        }
        if self.state != ClientState::NotConnected {
            tracing::info!(connect_target = ?self.target, reason, "disconnected from server");
        }

        self.state = ClientState::NotConnected;
        self.target = None;
        self.server = None;
        self.slot = None;
        self.started_at = None;
        self.last_received = None;
    }

    /// Disconnects (if connected) and releases the transport.
    pub fn shutdown(&mut self) {
        if self.state != ClientState::NotConnected {
            self.disconnect(DisconnectReason::ClientDisconnect.describe());
        }
        self.transport.shutdown();
    }
}
