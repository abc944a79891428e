//! Per-peer endpoint state.

use super::MuxError;
use crate::handshake::ClientHandshake;
use crate::session::{EncryptedSession, MessageChannel, Session};
use crate::utils::index::SessionId;
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Reply slot for a pending client handshake.
pub(crate) type HandshakeReply = oneshot::Sender<Result<SessionId, MuxError>>;

/// How an endpoint came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Created by the first datagram from an unknown peer.
    Accepted,
    /// Created locally by `connect` or `handshake`.
    Connected,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Accepted => write!(f, "accepted"),
            Origin::Connected => write!(f, "connected"),
        }
    }
}

/// Coarse endpoint phase, for listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Cleartext,
    Handshaking,
    Established,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Cleartext => write!(f, "cleartext"),
            Phase::Handshaking => write!(f, "handshaking"),
            Phase::Established => write!(f, "established"),
        }
    }
}

/// Snapshot of one endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub peer: SocketAddr,
    /// Id currently carried in frames (server-assigned after a client handshake).
    pub session_id: SessionId,
    /// Id allocated from this multiplexer's pool.
    pub local_id: SessionId,
    pub origin: Origin,
    pub phase: Phase,
}

pub(crate) enum EndpointState {
    /// No key agreed yet.
    Cleartext(Session),
    /// Client handshake in flight.
    Initiating {
        session: Session,
        handshake: ClientHandshake,
        /// Thumbprint of the key the proposal was encrypted to.
        server_thumbprint: String,
        reply: HandshakeReply,
        deadline_ms: u64,
    },
    /// Key agreed; every datagram is encrypted.
    Established(EncryptedSession),
    /// Placeholder while a transition owns the previous state.
    Closed,
}

impl EndpointState {
    pub(crate) fn phase(&self) -> Phase {
        match self {
            EndpointState::Cleartext(_) | EndpointState::Closed => Phase::Cleartext,
            EndpointState::Initiating { .. } => Phase::Handshaking,
            EndpointState::Established(_) => Phase::Established,
        }
    }

    /// The message channel in this state, if any.
    pub(crate) fn channel_mut(&mut self) -> Option<&mut dyn MessageChannel> {
        match self {
            EndpointState::Cleartext(session) => Some(session),
            EndpointState::Initiating { session, .. } => Some(session),
            EndpointState::Established(encrypted) => Some(encrypted),
            EndpointState::Closed => None,
        }
    }

    fn session_id(&self) -> Option<SessionId> {
        match self {
            EndpointState::Cleartext(session) => Some(session.id()),
            EndpointState::Initiating { session, .. } => Some(session.id()),
            EndpointState::Established(encrypted) => Some(encrypted.id()),
            EndpointState::Closed => None,
        }
    }
}

/// One remote peer on the multiplexer's socket.
pub(crate) struct Endpoint {
    pub(crate) peer: SocketAddr,
    pub(crate) origin: Origin,
    /// Id to return to the allocator when the endpoint goes away.
    pub(crate) local_id: SessionId,
    pub(crate) state: EndpointState,
}

impl Endpoint {
    pub(crate) fn new(peer: SocketAddr, origin: Origin, session: Session) -> Self {
        Self {
            peer,
            origin,
            local_id: session.id(),
            state: EndpointState::Cleartext(session),
        }
    }

    /// Id currently carried in this endpoint's frames.
    pub(crate) fn session_id(&self) -> SessionId {
        self.state.session_id().unwrap_or(self.local_id)
    }

    /// Take the state out, leaving `Closed` behind.
    pub(crate) fn take_state(&mut self) -> EndpointState {
        std::mem::replace(&mut self.state, EndpointState::Closed)
    }

    pub(crate) fn info(&self) -> SessionInfo {
        SessionInfo {
            peer: self.peer,
            session_id: self.session_id(),
            local_id: self.local_id,
            origin: self.origin,
            phase: self.state.phase(),
        }
    }

    /// Close the underlying session, failing any pending handshake.
    pub(crate) fn close(&mut self) {
        match self.take_state() {
            EndpointState::Cleartext(mut session) => session.close(),
            EndpointState::Initiating {
                mut session, reply, ..
            } => {
                session.close();
                let _ = reply.send(Err(MuxError::Closed));
            }
            EndpointState::Established(mut encrypted) => encrypted.close(),
            EndpointState::Closed => {}
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("peer", &self.peer)
            .field("origin", &self.origin)
            .field("local_id", &self.local_id)
            .field("phase", &self.state.phase())
            .finish()
    }
}
