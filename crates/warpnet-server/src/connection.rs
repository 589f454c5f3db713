//! The server connection manager.
//!
//! [`ServerConnection`] owns every client session. Each game tick the
//! server calls [`poll`](ServerConnection::poll), which:
//!
//! 1. turns transport events into new or closed sessions,
//! 2. applies auth verdicts from the platform,
//! 3. drains inbound data, running the auth handshake and relaying
//!    peer-to-peer traffic itself, and hands game messages back.
//!
//! It should also call
//! [`test_client_liveness_timeouts`](ServerConnection::test_client_liveness_timeouts)
//! once per tick to kick clients that went silent.

use std::collections::HashMap;
use std::time::Instant;

use warpnet_protocol::{
    ClientBeginAuthentication, DisconnectReason, Message, P2PSendingTicket, PeerIdentity,
    ServerPassAuthentication, ServerSendInfo, VoiceChatData,
};
use warpnet_transport::{ConnectionToken, SendReliability, Transport, TransportEvent};

use crate::{
    AuthRejection, AuthSessionResult, ClientSession, ServerAuth, ServerConfig, ServerError,
    SessionRegistry, SessionState,
};

/// A game message from an authenticated client.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub token: ConnectionToken,
    pub identity: PeerIdentity,
    pub slot: u32,
    pub message: Message,
}

/// Accepts, authenticates and tracks every client of one game server.
pub struct ServerConnection<T, A, R> {
    config: ServerConfig,
    transport: T,
    auth: A,
    registry: R,
    identity: Option<PeerIdentity>,
    sessions: HashMap<ConnectionToken, ClientSession>,
}

impl<T, A, R> ServerConnection<T, A, R>
where
    T: Transport,
    A: ServerAuth,
    R: SessionRegistry,
{
    /// Creates a server that is not yet listening. Call
    /// [`set_identity`](Self::set_identity) once the platform has logged
    /// the server in.
    pub fn new(
        config: ServerConfig,
        transport: T,
        auth: A,
        registry: R,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            auth,
            registry,
            identity: None,
            sessions: HashMap::new(),
        })
    }

    /// Records the server's platform identity and starts listening.
    pub fn set_identity(&mut self, identity: PeerIdentity) -> Result<(), ServerError> {
        if let Some(current) = self.identity {
            return Err(ServerError::IdentityAlreadySet(current));
        }
        if !identity.is_valid() {
            return Err(ServerError::InvalidIdentity(identity));
        }
        self.transport.listen(identity)?;
        self.identity = Some(identity);
        tracing::info!(%identity, name = %self.config.server_name, "server listening");
        Ok(())
    }

    // -- accessors ------------------------------------------------------------

    pub fn identity(&self) -> Option<PeerIdentity> {
        self.identity
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn session(&self, token: ConnectionToken) -> Option<&ClientSession> {
        self.sessions.get(&token)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &ClientSession> {
        self.sessions.values()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_connected()).count()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn auth_mut(&mut self) -> &mut A {
        &mut self.auth
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -- per-tick -------------------------------------------------------------

    /// Runs one tick of connection handling and returns the game
    /// messages that arrived from authenticated clients.
    pub fn poll(&mut self, now: Instant) -> Vec<InboundMessage> {
        for event in self.transport.poll_events() {
            self.on_transport_event(event, now);
        }
        for result in self.auth.poll_results() {
            self.on_auth_session_result(result);
        }
        self.receive_messages(now)
    }

    pub fn on_transport_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Incoming { token } => self.on_incoming(token, now),
            TransportEvent::StatusChanged {
                token,
                new,
                end_reason,
                detail,
                ..
            } => {
                if !new.is_closed() {
                    return;
                }
                if !self.sessions.contains_key(&token) {
                    tracing::debug!(%token, "close for unknown connection ignored");
                    return;
                }
                tracing::info!(%token, state = ?new, ?end_reason, %detail, "client connection closed");
                self.disconnect(token, DisconnectReason::ClientDisconnect, &detail);
            }
        }
    }

    fn on_incoming(&mut self, token: ConnectionToken, now: Instant) {
        if self.sessions.contains_key(&token) {
            tracing::warn!(%token, "duplicate connect for live session ignored");
            return;
        }
        let Some(server_identity) = self.identity else {
            tracing::warn!(%token, "connection before server identity was set");
            self.transport
                .close(token, DisconnectReason::ServerClosed, "server not ready");
            return;
        };

        self.sessions.insert(token, ClientSession::new(token, now));
        tracing::info!(%token, "client connected, awaiting authentication");

        let info = Message::ServerSendInfo(ServerSendInfo {
            server_identity,
            secure: self.auth.secure(),
            server_name: self.config.server_name.clone(),
        });
        if let Err(e) = self.send_message(token, &info, SendReliability::Reliable) {
            tracing::error!(%token, error = %e, "failed to send server info");
            self.disconnect(token, DisconnectReason::ServerClosed, "failed to send server info");
        }
    }

    /// Drains up to `receive_batch` messages and dispatches each one.
    pub fn receive_messages(&mut self, now: Instant) -> Vec<InboundMessage> {
        let mut for_game = Vec::new();
        for datagram in self.transport.receive(self.config.receive_batch) {
            let token = datagram.from;
            let Some(session) = self.sessions.get_mut(&token) else {
                tracing::debug!(%token, "data from unknown connection dropped");
                continue;
            };
            session.last_activity = now;
            let (state, identity, slot) = (session.state, session.identity, session.slot);

            let msg = match Message::decode(&datagram.data) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(%token, error = %e, "undecodable message dropped");
                    continue;
                }
            };

            if let Message::ClientBeginAuthentication(begin) = msg {
                self.on_client_begin_authentication(token, begin);
                continue;
            }

            let (SessionState::Connected, Some(identity), Some(slot)) = (state, identity, slot)
            else {
                tracing::warn!(
                    %token,
                    message = %msg.message_type(),
                    ?state,
                    "message before authentication dropped"
                );
                continue;
            };

            match msg {
                Message::VoiceChatData(voice) => self.relay_voice(token, identity, voice),
                Message::P2PSendingTicket(ticket) => self.relay_ticket(token, identity, ticket),
                msg if msg.message_type().is_server_message() => {
                    tracing::warn!(%token, message = %msg.message_type(), "server message from client dropped");
                }
                message => for_game.push(InboundMessage {
                    token,
                    identity,
                    slot,
                    message,
                }),
            }
        }
        for_game
    }

    fn on_client_begin_authentication(
        &mut self,
        token: ConnectionToken,
        begin: ClientBeginAuthentication,
    ) {
        let Some(session) = self.sessions.get(&token) else {
            return;
        };
        if session.state != SessionState::Pending {
            tracing::warn!(%token, state = ?session.state, "repeated authentication attempt dropped");
            return;
        }

        let identity = match (token.identity(), begin.sender) {
            (Some(observed), Some(claimed)) if observed != claimed => {
                tracing::warn!(%token, %claimed, "claimed identity does not match connection");
                return;
            }
            (Some(observed), _) => observed,
            (None, Some(claimed)) => claimed,
            (None, None) => {
                tracing::warn!(%token, "authentication without identity dropped");
                return;
            }
        };

        let duplicate = self
            .sessions
            .values()
            .any(|s| s.token != token && s.identity == Some(identity));
        if duplicate {
            tracing::warn!(%token, %identity, "identity already has a session");
            self.reject(token, DisconnectReason::ServerRejectedAuth, "identity already connected");
            return;
        }

        if !self.registry.can_admit_new_connection(token) {
            tracing::info!(%token, %identity, "server full, rejecting client");
            self.reject(token, DisconnectReason::ServerFull, "server full");
            return;
        }

        if let Some(session) = self.sessions.get_mut(&token) {
            session.state = SessionState::AuthInProgress;
            session.identity = Some(identity);
        }
        tracing::debug!(%token, %identity, "authentication started");

        if let Err(rejection) = self.auth.begin_auth_session(&begin.ticket, identity) {
            tracing::info!(%token, %identity, %rejection, "ticket rejected");
            self.reject(token, DisconnectReason::ServerRejectedAuth, &rejection.0);
        }
    }

    /// Applies the auth service's verdict for `identity`.
    ///
    /// Verdicts for sessions that are gone or no longer authenticating
    /// are stale and ignored.
    pub fn on_auth_session_result(&mut self, result: AuthSessionResult) {
        let AuthSessionResult { identity, outcome } = result;
        let Some(session) = self
            .sessions
            .values_mut()
            .find(|s| s.identity == Some(identity))
        else {
            tracing::debug!(%identity, "auth verdict for unknown identity ignored");
            return;
        };
        if session.state != SessionState::AuthInProgress {
            tracing::debug!(%identity, state = ?session.state, "stale auth verdict ignored");
            return;
        }
        let token = session.token;

        if let Err(AuthRejection(reason)) = outcome {
            tracing::info!(%token, %identity, %reason, "authentication failed");
            self.reject(token, DisconnectReason::ServerRejectedAuth, &reason);
            return;
        }

        let Some(slot) = self.registry.admit_authenticated_client(token, identity) else {
            tracing::info!(%token, %identity, "no free slot after authentication");
            self.reject(token, DisconnectReason::ServerFull, "no free player slot");
            return;
        };
        session.state = SessionState::Connected;
        session.slot = Some(slot);
        tracing::info!(%token, %identity, slot, "client authenticated");

        let pass = Message::ServerPassAuthentication(ServerPassAuthentication { slot });
        if let Err(e) = self.send_message(token, &pass, SendReliability::Reliable) {
            tracing::error!(%token, error = %e, "failed to send auth pass");
            self.disconnect(token, DisconnectReason::ServerClosed, "failed to send auth pass");
        }
    }

    /// Kicks every session that has been silent longer than the client
    /// timeout. Returns the kicked tokens.
    pub fn test_client_liveness_timeouts(&mut self, now: Instant) -> Vec<ConnectionToken> {
        let timeout = self.config.client_timeout();
        let expired: Vec<ConnectionToken> = self
            .sessions
            .values()
            .filter(|s| now.saturating_duration_since(s.last_activity) > timeout)
            .map(|s| s.token)
            .collect();

        for &token in &expired {
            tracing::info!(%token, "client timed out");
            self.disconnect(token, DisconnectReason::PeerKicked, "client timed out");
        }
        expired
    }

    // -- sending --------------------------------------------------------------

    pub fn send_message(
        &mut self,
        token: ConnectionToken,
        msg: &Message,
        reliability: SendReliability,
    ) -> Result<(), ServerError> {
        let bytes = msg.encode()?;
        self.transport.send(token, &bytes, reliability)?;
        Ok(())
    }

    /// Sends `msg` to every authenticated client.
    pub fn send_to_all(
        &mut self,
        msg: &Message,
        reliability: SendReliability,
    ) -> Result<(), ServerError> {
        self.broadcast(msg, reliability, None)
    }

    /// Sends `msg` to every authenticated client except `except`.
    pub fn send_to_all_except(
        &mut self,
        except: ConnectionToken,
        msg: &Message,
        reliability: SendReliability,
    ) -> Result<(), ServerError> {
        self.broadcast(msg, reliability, Some(except))
    }

    /// A failed send to one client is logged and does not stop the rest.
    fn broadcast(
        &mut self,
        msg: &Message,
        reliability: SendReliability,
        except: Option<ConnectionToken>,
    ) -> Result<(), ServerError> {
        let bytes = msg.encode()?;
        let targets: Vec<ConnectionToken> = self
            .sessions
            .values()
            .filter(|s| s.is_connected() && Some(s.token) != except)
            .map(|s| s.token)
            .collect();
        for token in targets {
            if let Err(e) = self.transport.send(token, &bytes, reliability) {
                tracing::warn!(%token, error = %e, message = %msg.message_type(), "broadcast send failed");
            }
        }
        Ok(())
    }

    fn relay_voice(&mut self, from: ConnectionToken, sender: PeerIdentity, voice: VoiceChatData) {
        let relayed = Message::VoiceChatData(VoiceChatData {
            sender,
            payload: voice.payload,
        });
        if let Err(e) = self.send_to_all_except(from, &relayed, SendReliability::Unreliable) {
            tracing::warn!(token = %from, error = %e, "voice relay failed");
        }
    }

    fn relay_ticket(&mut self, from: ConnectionToken, sender: PeerIdentity, ticket: P2PSendingTicket) {
        let target = self
            .sessions
            .values()
            .find(|s| s.is_connected() && s.identity == Some(ticket.identity))
            .map(|s| s.token);
        let Some(target) = target else {
            tracing::debug!(token = %from, recipient = %ticket.identity, "ticket for unknown player dropped");
            return;
        };
        let relayed = Message::P2PSendingTicket(P2PSendingTicket {
            identity: sender,
            ticket: ticket.ticket,
        });
        if let Err(e) = self.send_message(target, &relayed, SendReliability::Reliable) {
            tracing::warn!(token = %target, error = %e, "ticket relay failed");
        }
    }

    // -- teardown -------------------------------------------------------------

    /// Sends `ServerFailAuthentication` and disconnects.
    fn reject(&mut self, token: ConnectionToken, reason: DisconnectReason, detail: &str) {
        if let Err(e) = self.send_message(token, &Message::ServerFailAuthentication, SendReliability::Reliable) {
            tracing::debug!(%token, error = %e, "could not deliver auth failure");
        }
        self.disconnect(token, reason, detail);
    }

    /// Removes a session and closes its connection. Unknown tokens are
    /// ignored, so disconnecting twice is harmless.
    pub fn disconnect(&mut self, token: ConnectionToken, reason: DisconnectReason, detail: &str) {
        let Some(session) = self.sessions.remove(&token) else {
            return;
        };
        match session.state {
            SessionState::Pending => {}
            SessionState::AuthInProgress => self.registry.notify_auth_failed(token),
            SessionState::Connected => self.registry.notify_disconnected(token),
        }
        if let Some(identity) = session.identity {
            self.auth.end_auth_session(identity);
        }
        self.transport.close(token, reason, detail);
        tracing::info!(%token, %reason, %detail, "client disconnected");
    }

    pub fn kick(&mut self, token: ConnectionToken) {
        self.disconnect(token, DisconnectReason::PeerKicked, "kicked by server");
    }

    /// Tells connected clients the server is exiting, drops every
    /// session and shuts the transport down.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.send_to_all(&Message::ServerExiting, SendReliability::Reliable) {
            tracing::warn!(error = %e, "failed to announce shutdown");
        }
        let tokens: Vec<ConnectionToken> = self.sessions.keys().copied().collect();
        for token in tokens {
            self.disconnect(token, DisconnectReason::ServerClosed, "server shutting down");
        }
        self.transport.shutdown();
        tracing::info!("server shut down");
    }
}
