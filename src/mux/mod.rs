//! Cleartext Transport Multiplexer
//!
//! Turns one UDP socket into many logical sessions, one per remote socket
//! address. The first datagram from an unknown address creates an
//! accepted endpoint; `connect` and `handshake` create endpoints for known
//! peers.
//!
//! The multiplexer runs as a single task that owns every table: the
//! endpoint map, the session id pool, pending client handshakes and the
//! reassembly state inside each session. Datagrams arrive from the UDP
//! receive loop over the packet channel, handle calls arrive as commands
//! answered on oneshot channels, and a periodic tick drives handshake
//! deadlines and reassembly expiry. Each event runs to completion, so no
//! protocol state is ever shared or locked.
//!
//! ## Endpoint lifecycle
//!
//! ```text
//!   accepted:   Cleartext --init--> Established
//!                   \--bad init--> closed
//!   connected:  Cleartext --handshake()--> Initiating --confirm--> Established
//!                                              \--deadline--> Cleartext
//! ```
//!
//! The table is keyed by peer address rather than session id: a client
//! adopts the id its server assigned, which may collide with ids this
//! multiplexer allocated locally.

mod endpoint;

use crate::cipher::{FrameCipher, IvMode};
use crate::config::{Config, SessionConfig, UdpConfig};
use crate::dispatch::{Action, Dispatcher, PING};
use crate::handshake::{self, ClientHandshake, HandshakeError};
use crate::identity::{Identity, PeerKey};
use crate::session::{EncryptedSession, MessageChannel, Session, SessionError};
use crate::transport::udp::UdpTransport;
use crate::transport::{packet_channel, PacketRx, ReceivedPacket, TransportError};
use crate::utils::index::{IndexError, SessionId, SessionIdAllocator};
use crate::utils::now_ms;
use endpoint::{Endpoint, EndpointState, HandshakeReply};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

pub use endpoint::{Origin, Phase, SessionInfo};

/// Capacity of the datagram channel from the receive loop.
const PACKET_CHANNEL_SIZE: usize = 1024;

/// Capacity of the command channel from handles.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Errors returned by multiplexer handles.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("multiplexer closed")]
    Closed,

    #[error("no session with {0}")]
    UnknownPeer(SocketAddr),

    #[error("handshake with {0} already in progress")]
    HandshakeInProgress(SocketAddr),

    #[error("session with {0} already established")]
    AlreadyEstablished(SocketAddr),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("session id error: {0}")]
    Id(#[from] IndexError),
}

/// Multiplexer settings.
#[derive(Clone, Debug, Default)]
pub struct MuxConfig {
    /// Socket template; the port may be overridden at bind time.
    pub udp: UdpConfig,
    /// Timeouts, tick and event buffer.
    pub session: SessionConfig,
    /// IV policy for established sessions.
    pub iv_mode: IvMode,
}

impl MuxConfig {
    /// Extract the multiplexer settings from the node configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            udp: config.transports.udp.clone(),
            session: config.node.session.clone(),
            iv_mode: config.node.crypto.iv_mode,
        }
    }
}

/// Which side of the handshake this node played.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// Session events reported to the owner of the multiplexer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MuxEvent {
    /// An unknown peer sent its first datagram.
    Accepted { peer: SocketAddr, session_id: SessionId },
    /// A handshake completed.
    Established {
        peer: SocketAddr,
        session_id: SessionId,
        role: Role,
        /// The peer's key thumbprint: the client's on the server side, the
        /// server key's on the client side. None for anonymous clients.
        thumbprint: Option<String>,
        /// The client withheld its identity. Nothing about either end of an
        /// anonymous session may be persisted.
        anonymous: bool,
    },
    /// An application message arrived.
    Message { peer: SocketAddr, payload: Vec<u8> },
    /// A keep-alive answer arrived.
    Pong { peer: SocketAddr },
    /// An incomplete inbound message expired.
    DeliveryFailed { peer: SocketAddr, message_id: u32 },
    /// A session was closed and its endpoint removed.
    Closed { peer: SocketAddr },
}

impl MuxEvent {
    /// The remote peer this event concerns.
    pub fn peer(&self) -> SocketAddr {
        match self {
            MuxEvent::Accepted { peer, .. }
            | MuxEvent::Established { peer, .. }
            | MuxEvent::Message { peer, .. }
            | MuxEvent::Pong { peer }
            | MuxEvent::DeliveryFailed { peer, .. }
            | MuxEvent::Closed { peer } => *peer,
        }
    }
}

enum Command {
    Connect {
        peer: SocketAddr,
        reply: oneshot::Sender<Result<SessionId, MuxError>>,
    },
    Handshake {
        peer: SocketAddr,
        server_key: PeerKey,
        thumbprint: Option<String>,
        reply: HandshakeReply,
    },
    Send {
        peer: SocketAddr,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), MuxError>>,
    },
    CloseSession {
        peer: SocketAddr,
        reply: oneshot::Sender<bool>,
    },
    Sessions {
        reply: oneshot::Sender<Vec<SessionInfo>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running multiplexer.
///
/// Every call is a command to the multiplexer task. Once the task has
/// stopped, calls fail with `MuxError::Closed`.
#[derive(Clone, Debug)]
pub struct MultiplexerHandle {
    commands: mpsc::Sender<Command>,
    local_addr: SocketAddr,
}

impl MultiplexerHandle {
    /// The bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Whether the multiplexer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, MuxError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| MuxError::Closed)?;
        response.await.map_err(|_| MuxError::Closed)
    }

    /// Register a cleartext session with `peer` and return its id.
    ///
    /// Returns the existing id when a session with `peer` already exists.
    pub async fn connect(&self, peer: SocketAddr) -> Result<SessionId, MuxError> {
        self.request(|reply| Command::Connect { peer, reply }).await?
    }

    /// Run the client handshake against `peer`, whose public key is
    /// `server_key`. `thumbprint` authenticates us; None stays anonymous.
    ///
    /// Resolves with the server-assigned session id, or
    /// `HandshakeError::Timeout` once the handshake deadline passes.
    pub async fn handshake(
        &self,
        peer: SocketAddr,
        server_key: PeerKey,
        thumbprint: Option<String>,
    ) -> Result<SessionId, MuxError> {
        self.request(|reply| Command::Handshake {
            peer,
            server_key,
            thumbprint,
            reply,
        })
        .await?
    }

    /// Send one message to `peer` over its session.
    pub async fn send(&self, peer: SocketAddr, payload: &[u8]) -> Result<(), MuxError> {
        let payload = payload.to_vec();
        self.request(|reply| Command::Send {
            peer,
            payload,
            reply,
        })
        .await?
    }

    /// Close the session with `peer`. Returns false if there was none.
    pub async fn close_session(&self, peer: SocketAddr) -> Result<bool, MuxError> {
        self.request(|reply| Command::CloseSession { peer, reply })
            .await
    }

    /// List every session.
    pub async fn sessions(&self) -> Result<Vec<SessionInfo>, MuxError> {
        self.request(|reply| Command::Sessions { reply }).await
    }

    /// Stop the multiplexer, closing every session and the socket.
    ///
    /// Idempotent.
    pub async fn close(&self) {
        let _ = self.request(|reply| Command::Shutdown { reply }).await;
    }
}

/// The multiplexer task state.
pub struct Multiplexer {
    config: MuxConfig,
    identity: Arc<Identity>,
    transport: UdpTransport,
    local_addr: SocketAddr,
    endpoints: HashMap<SocketAddr, Endpoint>,
    ids: SessionIdAllocator,
    dispatcher: Dispatcher,
    /// Completed messages pushed by session subscribers.
    inbox_tx: std::sync::mpsc::Sender<(SocketAddr, Vec<u8>)>,
    inbox_rx: std::sync::mpsc::Receiver<(SocketAddr, Vec<u8>)>,
    events: mpsc::Sender<MuxEvent>,
}

impl Multiplexer {
    /// Bind a socket and start a multiplexer with the default opcode table.
    ///
    /// Binds `port` when given, otherwise the configured address (an
    /// ephemeral port by default). The returned handle carries the bound
    /// address; events arrive on the returned receiver.
    pub async fn bind(
        config: MuxConfig,
        identity: Arc<Identity>,
        port: Option<u16>,
    ) -> Result<(MultiplexerHandle, mpsc::Receiver<MuxEvent>), MuxError> {
        Self::bind_with_dispatcher(config, identity, port, Dispatcher::default()).await
    }

    /// Bind with a custom opcode table.
    pub async fn bind_with_dispatcher(
        config: MuxConfig,
        identity: Arc<Identity>,
        port: Option<u16>,
        dispatcher: Dispatcher,
    ) -> Result<(MultiplexerHandle, mpsc::Receiver<MuxEvent>), MuxError> {
        let (packet_tx, packet_rx) = packet_channel(PACKET_CHANNEL_SIZE);
        let mut transport = UdpTransport::new(config.udp.clone(), packet_tx);
        let local_addr = transport.start_async(port).await?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::channel(config.session.event_buffer.max(1));
        let (inbox_tx, inbox_rx) = std::sync::mpsc::channel();

        let mux = Multiplexer {
            config,
            identity,
            transport,
            local_addr,
            endpoints: HashMap::new(),
            ids: SessionIdAllocator::new(),
            dispatcher,
            inbox_tx,
            inbox_rx,
            events: event_tx,
        };
        tokio::spawn(mux.run(packet_rx, command_rx));

        Ok((
            MultiplexerHandle {
                commands: command_tx,
                local_addr,
            },
            event_rx,
        ))
    }

    async fn run(mut self, mut packet_rx: PacketRx, mut commands: mpsc::Receiver<Command>) {
        let mut tick = tokio::time::interval(Duration::from_millis(
            self.config.session.tick_interval_ms.max(1),
        ));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(local_addr = %self.local_addr, "Multiplexer started");

        loop {
            tokio::select! {
                packet = packet_rx.recv() => {
                    match packet {
                        Some(p) => self.handle_packet(p),
                        None => break, // receive loop gone
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(Command::Shutdown { reply }) => {
                            self.shutdown().await;
                            let _ = reply.send(());
                            return;
                        }
                        Some(command) => self.handle_command(command),
                        None => break, // every handle dropped
                    }
                }
                _ = tick.tick() => {
                    self.on_tick(now_ms());
                }
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        let peers: Vec<SocketAddr> = self.endpoints.keys().copied().collect();
        for peer in peers {
            self.remove_endpoint(peer);
        }
        if let Err(e) = self.transport.stop_async().await {
            debug!(error = %e, "Transport already stopped");
        }
        info!(local_addr = %self.local_addr, "Multiplexer stopped");
    }

    // === Inbound ===

    fn handle_packet(&mut self, packet: ReceivedPacket) {
        let peer = packet.remote_addr;

        if !self.endpoints.contains_key(&peer) {
            match self.create_endpoint(peer, Origin::Accepted) {
                Ok(session_id) => {
                    debug!(peer = %peer, session_id = %session_id, "Accepted session");
                    self.emit(MuxEvent::Accepted { peer, session_id });
                }
                Err(e) => {
                    warn!(error = %e, "Cannot accept session");
                    return;
                }
            }
        }

        self.handle_datagram(peer, &packet.data, packet.timestamp_ms);
        self.drain_inbox();
    }

    fn handle_datagram(&mut self, peer: SocketAddr, data: &[u8], now_ms: u64) {
        let (origin, state) = match self.endpoints.get_mut(&peer) {
            Some(endpoint) => (endpoint.origin, endpoint.take_state()),
            None => return,
        };

        let next = match state {
            EndpointState::Cleartext(session) if origin == Origin::Accepted => {
                self.accept_handshake(peer, session, data)
            }
            EndpointState::Cleartext(mut session) => {
                session.on_frame(data, now_ms);
                Some(EndpointState::Cleartext(session))
            }
            EndpointState::Initiating {
                session,
                handshake,
                server_thumbprint,
                reply,
                deadline_ms,
            } => match handshake.accept_confirm(data) {
                Some(server_id) => self.complete_handshake(
                    peer,
                    session,
                    handshake,
                    server_thumbprint,
                    reply,
                    server_id,
                ),
                None => {
                    debug!(peer = %peer, bytes = data.len(), "Ignoring datagram during handshake");
                    Some(EndpointState::Initiating {
                        session,
                        handshake,
                        server_thumbprint,
                        reply,
                        deadline_ms,
                    })
                }
            },
            EndpointState::Established(mut encrypted) => {
                match encrypted.on_datagram(data, now_ms) {
                    Ok(_) => Some(EndpointState::Established(encrypted)),
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "Undecryptable datagram, closing session");
                        encrypted.close();
                        None
                    }
                }
            }
            EndpointState::Closed => None,
        };

        match next {
            Some(state) => {
                if let Some(endpoint) = self.endpoints.get_mut(&peer) {
                    endpoint.state = state;
                }
            }
            None => {
                self.remove_endpoint(peer);
            }
        }
    }

    /// Server side: the first datagram of an accepted session must be a
    /// handshake proposal. Anything else closes the session.
    fn accept_handshake(
        &mut self,
        peer: SocketAddr,
        mut session: Session,
        data: &[u8],
    ) -> Option<EndpointState> {
        let init = match handshake::accept_init(&self.identity, data) {
            Ok(init) => init,
            Err(e) => {
                debug!(peer = %peer, error = %e, "Handshake rejected, closing session");
                session.close();
                return None;
            }
        };

        let cipher = FrameCipher::new(init.key.clone(), self.config.iv_mode);
        let sent = handshake::confirm_datagram(&cipher, init.nonce, session.id())
            .map_err(MuxError::from)
            .and_then(|confirm| Ok(session.send_datagram(&confirm)?));
        if let Err(e) = sent {
            warn!(error = %e, "Failed to confirm handshake");
            session.close();
            return None;
        }

        let mut encrypted = EncryptedSession::new(session, cipher);
        let session_id = encrypted.id();
        match &init.thumbprint {
            Some(thumbprint) => {
                info!(peer = %peer, session_id = %session_id, thumbprint = %thumbprint, "Session established")
            }
            None => debug!(peer = %peer, session_id = %session_id, "Anonymous session established"),
        }

        self.emit(MuxEvent::Established {
            peer,
            session_id,
            role: Role::Server,
            anonymous: init.thumbprint.is_none(),
            thumbprint: init.thumbprint,
        });
        send_ping(peer, &mut encrypted);
        Some(EndpointState::Established(encrypted))
    }

    /// Client side: a matching confirmation arrived.
    fn complete_handshake(
        &mut self,
        peer: SocketAddr,
        mut session: Session,
        handshake: ClientHandshake,
        server_thumbprint: String,
        reply: HandshakeReply,
        server_id: SessionId,
    ) -> Option<EndpointState> {
        if let Err(e) = session.adopt_id(server_id) {
            let _ = reply.send(Err(e.into()));
            session.close();
            return None;
        }

        let anonymous = handshake.is_anonymous();
        let mut encrypted = EncryptedSession::new(session, handshake.into_cipher());
        info!(peer = %peer, session_id = %server_id, "Session established");

        let _ = reply.send(Ok(server_id));
        self.emit(MuxEvent::Established {
            peer,
            session_id: server_id,
            role: Role::Client,
            thumbprint: Some(server_thumbprint),
            anonymous,
        });
        send_ping(peer, &mut encrypted);
        Some(EndpointState::Established(encrypted))
    }

    fn drain_inbox(&mut self) {
        while let Ok((peer, message)) = self.inbox_rx.try_recv() {
            self.dispatch_message(peer, message);
        }
    }

    /// Route one completed message: established sessions go through the
    /// opcode table, cleartext sessions straight to the application.
    fn dispatch_message(&mut self, peer: SocketAddr, message: Vec<u8>) {
        let established = match self.endpoints.get(&peer) {
            Some(endpoint) => matches!(endpoint.state, EndpointState::Established(_)),
            None => return,
        };
        if !established {
            self.emit(MuxEvent::Message {
                peer,
                payload: message,
            });
            return;
        }

        match self.dispatcher.dispatch(&message) {
            Action::Reply(response) => {
                if let Some(EndpointState::Established(encrypted)) =
                    self.endpoints.get_mut(&peer).map(|e| &mut e.state)
                {
                    trace!(peer = %peer, bytes = response.len(), "Replying");
                    if let Err(e) = encrypted.send_message(&response) {
                        debug!(peer = %peer, error = %e, "Failed to send reply");
                    }
                }
            }
            Action::Pong => {
                trace!(peer = %peer, "Pong");
                self.emit(MuxEvent::Pong { peer });
            }
            Action::Deliver => self.emit(MuxEvent::Message {
                peer,
                payload: message,
            }),
            Action::Ignore => {}
        }
    }

    // === Commands ===

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { peer, reply } => {
                let result = match self.endpoints.get(&peer) {
                    Some(endpoint) => Ok(endpoint.session_id()),
                    None => self.create_endpoint(peer, Origin::Connected),
                };
                let _ = reply.send(result);
            }
            Command::Handshake {
                peer,
                server_key,
                thumbprint,
                reply,
            } => self.start_handshake(peer, server_key, thumbprint, reply),
            Command::Send {
                peer,
                payload,
                reply,
            } => {
                let _ = reply.send(self.send_to(peer, &payload));
            }
            Command::CloseSession { peer, reply } => {
                let _ = reply.send(self.remove_endpoint(peer));
            }
            Command::Sessions { reply } => {
                let mut sessions: Vec<SessionInfo> =
                    self.endpoints.values().map(Endpoint::info).collect();
                sessions.sort_by_key(|s| s.local_id);
                let _ = reply.send(sessions);
            }
            // Handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn start_handshake(
        &mut self,
        peer: SocketAddr,
        server_key: PeerKey,
        thumbprint: Option<String>,
        reply: HandshakeReply,
    ) {
        if !self.endpoints.contains_key(&peer) {
            if let Err(e) = self.create_endpoint(peer, Origin::Connected) {
                let _ = reply.send(Err(e));
                return;
            }
        }
        let Some(endpoint) = self.endpoints.get_mut(&peer) else {
            let _ = reply.send(Err(MuxError::UnknownPeer(peer)));
            return;
        };

        match endpoint.take_state() {
            EndpointState::Cleartext(mut session) => {
                let handshake = ClientHandshake::new(thumbprint, self.config.iv_mode);
                let sent = handshake
                    .init_datagram(&server_key)
                    .map_err(MuxError::from)
                    .and_then(|init| Ok(session.send_datagram(&init)?));
                if let Err(e) = sent {
                    endpoint.state = EndpointState::Cleartext(session);
                    let _ = reply.send(Err(e));
                    return;
                }

                debug!(
                    peer = %peer,
                    anonymous = handshake.is_anonymous(),
                    "Handshake initiated"
                );
                endpoint.state = EndpointState::Initiating {
                    session,
                    handshake,
                    server_thumbprint: server_key.thumbprint().to_string(),
                    reply,
                    deadline_ms: now_ms() + self.config.session.handshake_timeout_ms,
                };
            }
            state @ EndpointState::Initiating { .. } => {
                endpoint.state = state;
                let _ = reply.send(Err(MuxError::HandshakeInProgress(peer)));
            }
            state => {
                endpoint.state = state;
                let _ = reply.send(Err(MuxError::AlreadyEstablished(peer)));
            }
        }
    }

    fn send_to(&mut self, peer: SocketAddr, payload: &[u8]) -> Result<(), MuxError> {
        let endpoint = self
            .endpoints
            .get_mut(&peer)
            .ok_or(MuxError::UnknownPeer(peer))?;
        if let EndpointState::Initiating { .. } = endpoint.state {
            return Err(MuxError::HandshakeInProgress(peer));
        }
        let channel = endpoint
            .state
            .channel_mut()
            .ok_or(MuxError::UnknownPeer(peer))?;
        Ok(channel.send_message(payload)?)
    }

    // === Timers ===

    fn on_tick(&mut self, now_ms: u64) {
        let timed_out: Vec<SocketAddr> = self
            .endpoints
            .values()
            .filter(|e| {
                matches!(e.state, EndpointState::Initiating { deadline_ms, .. } if deadline_ms <= now_ms)
            })
            .map(|e| e.peer)
            .collect();

        for peer in timed_out {
            if let Some(endpoint) = self.endpoints.get_mut(&peer) {
                match endpoint.take_state() {
                    EndpointState::Initiating { session, reply, .. } => {
                        debug!(peer = %peer, "Handshake timed out");
                        let _ = reply.send(Err(HandshakeError::Timeout.into()));
                        endpoint.state = EndpointState::Cleartext(session);
                    }
                    other => endpoint.state = other,
                }
            }
        }

        let mut failures = Vec::new();
        for endpoint in self.endpoints.values_mut() {
            if let Some(channel) = endpoint.state.channel_mut() {
                for message_id in channel.evict_expired(now_ms) {
                    failures.push((endpoint.peer, message_id));
                }
            }
        }
        for (peer, message_id) in failures {
            debug!(peer = %peer, message_id, "Incomplete message expired");
            self.emit(MuxEvent::DeliveryFailed { peer, message_id });
        }
    }

    // === Table management ===

    fn create_endpoint(&mut self, peer: SocketAddr, origin: Origin) -> Result<SessionId, MuxError> {
        let id = self.ids.allocate()?;
        let sink = match self.transport.sink_to(peer) {
            Ok(sink) => sink,
            Err(e) => {
                let _ = self.ids.free(id);
                return Err(e.into());
            }
        };

        let mut session = Session::new(id, Box::new(sink))
            .with_reassembly_timeout(self.config.session.reassembly_timeout_ms)
            .with_pending_limits(
                self.config.session.max_pending_messages,
                self.config.session.max_pending_bytes,
            );
        let inbox = self.inbox_tx.clone();
        session.subscribe(Box::new(move |message: &[u8]| {
            let _ = inbox.send((peer, message.to_vec()));
        }));

        self.endpoints.insert(peer, Endpoint::new(peer, origin, session));
        Ok(id)
    }

    fn remove_endpoint(&mut self, peer: SocketAddr) -> bool {
        let Some(mut endpoint) = self.endpoints.remove(&peer) else {
            return false;
        };
        endpoint.close();
        if let Err(e) = self.ids.free(endpoint.local_id) {
            warn!(error = %e, "Session id was not allocated");
        }
        debug!(peer = %peer, session_id = %endpoint.local_id, "Session closed");
        self.emit(MuxEvent::Closed { peer });
        true
    }

    fn emit(&self, event: MuxEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(peer = %event.peer(), "Event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn send_ping(peer: SocketAddr, encrypted: &mut EncryptedSession) {
    trace!(peer = %peer, "Sending session ping");
    if let Err(e) = encrypted.send_message(&PING) {
        debug!(peer = %peer, error = %e, "Failed to send ping");
    }
}
