//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Socket I/O runs on Tokio tasks spawned onto a runtime handle supplied
//! by the caller. Each connection task owns its WebSocket stream and talks
//! to the polling side through two channels: an outbound queue per
//! connection, and one shared inbound channel that acts as the poll group
//! for every connection. The [`Transport`] methods never await; they only
//! push to or drain from those channels.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use warpnet_protocol::{DisconnectReason, PeerIdentity};

use crate::{
    close_code, ConnectionHandle, ConnectionState, ConnectionToken, Datagram,
    SendReliability, Transport, TransportError, TransportEvent,
};

/// Counter for generating unique connection handles.
static NEXT_CONNECTION_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> ConnectionHandle {
    ConnectionHandle::new(NEXT_CONNECTION_HANDLE.fetch_add(1, Ordering::Relaxed))
}

// ---------------------------------------------------------------------------
// PeerDirectory
// ---------------------------------------------------------------------------

/// Resolves peer identities to WebSocket URLs for outbound connects.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    urls: HashMap<PeerIdentity, String>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records where `identity` can be reached (e.g. `ws://host:port`).
    pub fn insert(&mut self, identity: PeerIdentity, url: impl Into<String>) {
        self.urls.insert(identity, url.into());
    }

    pub fn resolve(&self, identity: PeerIdentity) -> Option<&str> {
        self.urls.get(&identity).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Channel messages
// ---------------------------------------------------------------------------

/// Polling side → connection task.
#[derive(Debug)]
enum Outbound {
    Data(Bytes),
    Close { code: u16, reason: String },
}

/// Connection tasks → polling side.
#[derive(Debug)]
enum Inbound {
    Accepted {
        handle: ConnectionHandle,
        outbound: mpsc::UnboundedSender<Outbound>,
    },
    Connected {
        handle: ConnectionHandle,
    },
    Data {
        handle: ConnectionHandle,
        data: Bytes,
    },
    Closed {
        handle: ConnectionHandle,
        code: Option<u16>,
        detail: String,
    },
}

struct ConnectionEntry {
    outbound: mpsc::UnboundedSender<Outbound>,
    state: ConnectionState,
}

// ---------------------------------------------------------------------------
// WebSocketTransport
// ---------------------------------------------------------------------------

/// A [`Transport`] over real WebSocket connections.
///
/// Tokens are always [`ConnectionToken::Handle`]. Closing a connection
/// sends a close frame whose code is [`close_code`] of the reason, so the
/// peer's `StatusChanged` event carries it as `end_reason`.
pub struct WebSocketTransport {
    runtime: Handle,
    directory: PeerDirectory,
    bind_addr: String,
    local_addr: Option<SocketAddr>,
    listener: Option<JoinHandle<()>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    connections: HashMap<ConnectionHandle, ConnectionEntry>,
    events: Vec<TransportEvent>,
    data: VecDeque<Datagram>,
}

impl WebSocketTransport {
    /// Creates a transport that spawns its socket tasks on `runtime` and
    /// resolves outbound peers through `directory`.
    pub fn new(runtime: Handle, directory: PeerDirectory) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            directory,
            bind_addr: "127.0.0.1:0".into(),
            local_addr: None,
            listener: None,
            inbound_tx,
            inbound_rx,
            connections: HashMap::new(),
            events: Vec::new(),
            data: VecDeque::new(),
        }
    }

    /// Sets the address `listen` binds to. Defaults to `127.0.0.1:0`.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// The bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn directory_mut(&mut self) -> &mut PeerDirectory {
        &mut self.directory
    }

    /// Moves everything the connection tasks reported into local queues.
    fn pump(&mut self) {
        while let Ok(inbound) = self.inbound_rx.try_recv() {
            match inbound {
                Inbound::Accepted { handle, outbound } => {
                    self.connections.insert(
                        handle,
                        ConnectionEntry {
                            outbound,
                            state: ConnectionState::Connected,
                        },
                    );
                    self.events.push(TransportEvent::Incoming {
                        token: ConnectionToken::Handle(handle),
                    });
                }
                Inbound::Connected { handle } => {
                    let Some(entry) = self.connections.get_mut(&handle) else {
                        continue;
                    };
                    let old = entry.state;
                    entry.state = ConnectionState::Connected;
                    self.events.push(TransportEvent::StatusChanged {
                        token: ConnectionToken::Handle(handle),
                        old,
                        new: ConnectionState::Connected,
                        end_reason: None,
                        detail: String::new(),
                    });
                }
                Inbound::Data { handle, data } => {
                    // Data for a connection we already closed is dropped.
                    if self.connections.contains_key(&handle) {
                        self.data.push_back(Datagram {
                            from: ConnectionToken::Handle(handle),
                            data,
                        });
                    }
                }
                Inbound::Closed { handle, code, detail } => {
                    let Some(entry) = self.connections.remove(&handle) else {
                        continue;
                    };
                    let new = if code.is_some() {
                        ConnectionState::ClosedByPeer
                    } else {
                        ConnectionState::ProblemDetectedLocally
                    };
                    tracing::debug!(%handle, ?code, %detail, "WebSocket connection ended");
                    self.events.push(TransportEvent::StatusChanged {
                        token: ConnectionToken::Handle(handle),
                        old: entry.state,
                        new,
                        end_reason: code,
                        detail,
                    });
                }
            }
        }
    }

    fn entry(&self, token: ConnectionToken) -> Result<&ConnectionEntry, TransportError> {
        let ConnectionToken::Handle(handle) = token else {
            return Err(TransportError::ForeignToken(token));
        };
        self.connections
            .get(&handle)
            .ok_or(TransportError::UnknownConnection(token))
    }
}

impl Transport for WebSocketTransport {
    fn listen(&mut self, local: PeerIdentity) -> Result<(), TransportError> {
        if self.listener.is_some() {
            return Err(TransportError::AlreadyListening(local));
        }

        // Bind synchronously so errors and the port are known right away.
        let std_listener =
            std::net::TcpListener::bind(&self.bind_addr).map_err(TransportError::ListenFailed)?;
        std_listener
            .set_nonblocking(true)
            .map_err(TransportError::ListenFailed)?;
        let addr = std_listener.local_addr().map_err(TransportError::ListenFailed)?;

        let _guard = self.runtime.enter();
        let listener = TcpListener::from_std(std_listener).map_err(TransportError::ListenFailed)?;
        let inbound = self.inbound_tx.clone();
        self.listener = Some(self.runtime.spawn(accept_loop(listener, inbound)));
        self.local_addr = Some(addr);

        tracing::info!(%local, %addr, "WebSocket transport listening");
        Ok(())
    }

    fn connect(&mut self, remote: PeerIdentity) -> Result<ConnectionToken, TransportError> {
        let url = self
            .directory
            .resolve(remote)
            .ok_or(TransportError::UnknownPeer(remote))?
            .to_owned();

        let handle = next_handle();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        self.connections.insert(
            handle,
            ConnectionEntry {
                outbound,
                state: ConnectionState::Connecting,
            },
        );

        let inbound = self.inbound_tx.clone();
        self.runtime.spawn(async move {
            match tokio_tungstenite::connect_async(&url).await {
                Ok((ws, _)) => {
                    let _ = inbound.send(Inbound::Connected { handle });
                    run_connection(handle, ws, outbound_rx, inbound).await;
                }
                Err(e) => {
                    let _ = inbound.send(Inbound::Closed {
                        handle,
                        code: None,
                        detail: format!("connect to {url} failed: {e}"),
                    });
                }
            }
        });

        tracing::debug!(%handle, %remote, "WebSocket connect started");
        Ok(ConnectionToken::Handle(handle))
    }

    fn send(
        &mut self,
        to: ConnectionToken,
        data: &[u8],
        // A WebSocket stream has no unreliable channel.
        _reliability: SendReliability,
    ) -> Result<(), TransportError> {
        self.pump();
        let entry = self.entry(to)?;
        entry
            .outbound
            .send(Outbound::Data(Bytes::copy_from_slice(data)))
            .map_err(|_| TransportError::ConnectionClosed(to.to_string()))
    }

    fn receive(&mut self, max: usize) -> Vec<Datagram> {
        self.pump();
        let n = max.min(self.data.len());
        self.data.drain(..n).collect()
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        self.pump();
        std::mem::take(&mut self.events)
    }

    fn close(&mut self, token: ConnectionToken, reason: DisconnectReason, detail: &str) {
        let ConnectionToken::Handle(handle) = token else {
            return;
        };
        // The connection may already have been reported closed; whatever
        // is still queued for it is dropped either way.
        self.events.retain(|event| event.token() != token);
        self.data.retain(|datagram| datagram.from != token);
        let Some(entry) = self.connections.remove(&handle) else {
            return;
        };
        tracing::debug!(%handle, %reason, %detail, "closing WebSocket connection");
        let _ = entry.outbound.send(Outbound::Close {
            code: close_code(reason),
            reason: detail.to_owned(),
        });
    }

    fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        for (_, entry) in self.connections.drain() {
            let _ = entry.outbound.send(Outbound::Close {
                code: CloseCode::Normal.into(),
                reason: "transport shutdown".into(),
            });
        }
        self.events.clear();
        self.data.clear();
        self.local_addr = None;
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Socket tasks
// ---------------------------------------------------------------------------

async fn accept_loop(listener: TcpListener, inbound: mpsc::UnboundedSender<Inbound>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "WebSocket accept failed");
                continue;
            }
        };

        let inbound = inbound.clone();
        tokio::spawn(async move {
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::warn!(%addr, error = %e, "WebSocket handshake failed");
                    return;
                }
            };
            let handle = next_handle();
            tracing::debug!(%handle, %addr, "accepted WebSocket connection");

            let (outbound, outbound_rx) = mpsc::unbounded_channel();
            if inbound.send(Inbound::Accepted { handle, outbound }).is_err() {
                return;
            }
            run_connection(handle, ws, outbound_rx, inbound).await;
        });
    }
}

/// Pumps one connection until either side closes it.
async fn run_connection<S>(
    handle: ConnectionHandle,
    ws: tokio_tungstenite::WebSocketStream<S>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<Inbound>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let closed = |code: Option<u16>, detail: String| Inbound::Closed { handle, code, detail };

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Data(data)) => {
                    if let Err(e) = sink.send(Message::Binary(data.to_vec().into())).await {
                        let _ = inbound.send(closed(None, format!("send failed: {e}")));
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    return;
                }
                // The transport was dropped.
                None => return,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    let data: Vec<u8> = data.into();
                    let _ = inbound.send(Inbound::Data { handle, data: Bytes::from(data) });
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, detail) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()),
                        None => (Some(u16::from(CloseCode::Status)), String::new()),
                    };
                    let _ = inbound.send(closed(code, detail));
                    return;
                }
                Some(Ok(_)) => {} // skip text/ping/pong/frame
                Some(Err(e)) => {
                    let _ = inbound.send(closed(None, format!("receive failed: {e}")));
                    return;
                }
                None => {
                    let _ = inbound.send(closed(None, "stream ended".into()));
                    return;
                }
            },
        }
    }
}
