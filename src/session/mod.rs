//! Datagram Sessions
//!
//! A `Session` is a logical, bidirectional, message-oriented channel over
//! a datagram transport. It splits outbound messages into fragments of at
//! most 4096 bytes, reassembles inbound fragments (tolerating reordering
//! and duplication), and hands completed messages to its subscribers in
//! registration order.
//!
//! Sessions own framing only. Delivery goes through the `DatagramSink`
//! the transport supplies, and nothing is acknowledged or retransmitted:
//! a lost fragment stalls its message until the reassembly entry expires.
//!
//! `EncryptedSession` wraps a `Session` once the handshake has agreed a
//! key. Both implement `MessageChannel`, which is the contract the
//! multiplexer and the dispatch layer program against.

mod encrypted;
mod observer;
mod reassembly;
pub mod wire;

use crate::cipher::CipherError;
use crate::transport::{DatagramSink, TransportError};
use crate::utils::index::{IndexError, SessionId};
use reassembly::{Accept, ReassemblyState};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, trace};
use wire::{FragmentHeader, FRAGMENT_HEADER_SIZE, FRAGMENT_SIZE};

pub use encrypted::EncryptedSession;
pub use observer::{MessageCallback, SubscriberId};

use observer::Observers;

/// Default lifetime of an incomplete reassembly entry.
pub const DEFAULT_REASSEMBLY_TIMEOUT_MS: u64 = 30_000;

/// Largest message a session can frame (16-bit fragment index).
pub const MAX_MESSAGE_SIZE: usize = FRAGMENT_SIZE * (u16::MAX as usize + 1);

/// Default cap on messages reassembling at once per session.
pub const DEFAULT_MAX_PENDING_MESSAGES: usize = 64;

/// Default cap on buffer bytes reserved by pending messages per session.
pub const DEFAULT_MAX_PENDING_BYTES: usize = MAX_MESSAGE_SIZE;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session closed")]
    Closed,

    #[error("message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("send failed: {0}")]
    Send(#[from] TransportError),

    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("session id error: {0}")]
    Id(#[from] IndexError),
}

/// Send/receive contract shared by plain and encrypted sessions.
pub trait MessageChannel {
    /// Current session id.
    fn id(&self) -> SessionId;

    /// Frame and transmit one logical message.
    fn send_message(&mut self, payload: &[u8]) -> Result<(), SessionError>;

    /// Feed one inbound datagram. Returns true if it completed a message.
    fn on_datagram(&mut self, datagram: &[u8], now_ms: u64) -> Result<bool, SessionError>;

    /// Register a message subscriber.
    fn subscribe(&mut self, callback: MessageCallback) -> SubscriberId;

    /// Remove a message subscriber.
    fn unsubscribe(&mut self, id: SubscriberId) -> bool;

    /// Drop reassembly entries past their deadline, returning their ids.
    fn evict_expired(&mut self, now_ms: u64) -> Vec<u32>;

    /// Close the session. Idempotent.
    fn close(&mut self);

    /// Whether `close` has been called.
    fn is_closed(&self) -> bool;
}

/// A cleartext datagram session.
pub struct Session {
    id: SessionId,
    id_adopted: bool,
    outgoing_message_counter: u32,
    reassembly: HashMap<u32, ReassemblyState>,
    /// Delivered message ids and the time they stop shadowing duplicates.
    completed: HashMap<u32, u64>,
    pending_bytes: usize,
    max_pending_messages: usize,
    max_pending_bytes: usize,
    observers: Observers,
    sink: Box<dyn DatagramSink>,
    reassembly_timeout_ms: u64,
    closed: bool,
}

impl Session {
    /// Create a session that transmits through `sink`.
    pub fn new(id: SessionId, sink: Box<dyn DatagramSink>) -> Self {
        Self {
            id,
            id_adopted: false,
            outgoing_message_counter: 0,
            reassembly: HashMap::new(),
            completed: HashMap::new(),
            pending_bytes: 0,
            max_pending_messages: DEFAULT_MAX_PENDING_MESSAGES,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            observers: Observers::default(),
            sink,
            reassembly_timeout_ms: DEFAULT_REASSEMBLY_TIMEOUT_MS,
            closed: false,
        }
    }

    /// Set how long an incomplete message may wait for its fragments.
    pub fn with_reassembly_timeout(mut self, timeout_ms: u64) -> Self {
        self.reassembly_timeout_ms = timeout_ms;
        self
    }

    /// Bound how many messages, and how many reserved buffer bytes, may be
    /// reassembling at once. Fragments opening a message beyond either
    /// bound are dropped.
    pub fn with_pending_limits(mut self, max_messages: usize, max_bytes: usize) -> Self {
        self.max_pending_messages = max_messages;
        self.max_pending_bytes = max_bytes;
        self
    }

    /// Current session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Adopt the id the far end assigned to this session.
    ///
    /// Allowed once; a second call fails with `AlreadyAssigned`.
    pub fn adopt_id(&mut self, id: SessionId) -> Result<(), IndexError> {
        if self.id_adopted {
            return Err(IndexError::AlreadyAssigned {
                current: self.id.as_u16(),
                requested: id.as_u16(),
            });
        }
        self.id = id;
        self.id_adopted = true;
        Ok(())
    }

    /// Whether the id was adopted from the far end.
    pub fn has_adopted_id(&self) -> bool {
        self.id_adopted
    }

    /// Number of messages currently being reassembled.
    pub fn pending_messages(&self) -> usize {
        self.reassembly.len()
    }

    /// Buffer bytes reserved by messages being reassembled.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }

    /// Split a message into fragment frames without sending them.
    ///
    /// Consumes one message id. An empty message yields one empty fragment.
    pub fn frame_message(&mut self, payload: &[u8]) -> Result<Vec<Vec<u8>>, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(SessionError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let message_id = self.outgoing_message_counter;
        self.outgoing_message_counter = self.outgoing_message_counter.wrapping_add(1);

        let session_id = self.id;
        let total_length = payload.len() as u32;
        let header = |index: usize| FragmentHeader {
            message_id,
            session_id,
            fragment_index: index as u16,
            total_length,
        };

        if payload.is_empty() {
            return Ok(vec![header(0).encode(&[])]);
        }

        Ok(payload
            .chunks(FRAGMENT_SIZE)
            .enumerate()
            .map(|(i, chunk)| header(i).encode(chunk))
            .collect())
    }

    /// Frame a message and transmit every fragment in order.
    pub fn send_message(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let frames = self.frame_message(payload)?;
        trace!(
            session_id = %self.id,
            bytes = payload.len(),
            fragments = frames.len(),
            "Sending message"
        );
        for frame in frames {
            self.send_datagram(&frame)?;
        }
        Ok(())
    }

    /// Transmit one raw datagram through the underlying sink.
    pub fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.sink.send_datagram(datagram)?;
        Ok(())
    }

    /// Process one inbound fragment frame.
    ///
    /// Malformed, foreign and duplicate frames are dropped silently.
    /// Returns true when this frame completed (and delivered) a message.
    pub fn on_frame(&mut self, frame: &[u8], now_ms: u64) -> bool {
        if self.closed {
            return false;
        }

        let header = match FragmentHeader::parse(frame) {
            Some(h) => h,
            None => return false,
        };

        if header.session_id != self.id {
            debug!(
                session_id = %self.id,
                frame_session_id = %header.session_id,
                "Fragment for another session, dropping"
            );
            return false;
        }

        let total_length = header.total_length as usize;
        if total_length > MAX_MESSAGE_SIZE {
            return false;
        }

        if let Some(&until_ms) = self.completed.get(&header.message_id) {
            if now_ms < until_ms {
                trace!(
                    session_id = %self.id,
                    message_id = header.message_id,
                    fragment_index = header.fragment_index,
                    "Fragment of delivered message"
                );
                return false;
            }
            self.completed.remove(&header.message_id);
        }

        let expires_at_ms = now_ms.saturating_add(self.reassembly_timeout_ms);
        if !self.reassembly.contains_key(&header.message_id) {
            if self.reassembly.len() >= self.max_pending_messages
                || self.pending_bytes.saturating_add(total_length) > self.max_pending_bytes
            {
                debug!(
                    session_id = %self.id,
                    message_id = header.message_id,
                    total_length,
                    pending = self.reassembly.len(),
                    pending_bytes = self.pending_bytes,
                    "Reassembly limit reached, dropping"
                );
                return false;
            }
            self.pending_bytes += total_length;
            self.reassembly.insert(
                header.message_id,
                ReassemblyState::new(header.total_length, expires_at_ms),
            );
        }
        let state = match self.reassembly.get_mut(&header.message_id) {
            Some(state) => state,
            None => return false,
        };

        match state.accept(&header, &frame[FRAGMENT_HEADER_SIZE..]) {
            Accept::Stored => false,
            Accept::Duplicate => {
                trace!(
                    session_id = %self.id,
                    message_id = header.message_id,
                    fragment_index = header.fragment_index,
                    "Duplicate fragment"
                );
                false
            }
            Accept::Malformed => {
                debug!(
                    session_id = %self.id,
                    message_id = header.message_id,
                    fragment_index = header.fragment_index,
                    "Malformed fragment, dropping"
                );
                false
            }
            Accept::Complete => {
                let message = match self.reassembly.remove(&header.message_id) {
                    Some(state) => state.into_message(),
                    None => return false,
                };
                self.pending_bytes = self.pending_bytes.saturating_sub(message.len());
                self.completed.insert(header.message_id, expires_at_ms);
                self.observers.deliver(&message);
                true
            }
        }
    }

    /// Drop reassembly entries past their deadline.
    ///
    /// Also forgets delivered message ids whose duplicate window has passed.
    /// Only incomplete messages are reported.
    pub fn evict_expired(&mut self, now_ms: u64) -> Vec<u32> {
        self.completed.retain(|_, until_ms| now_ms < *until_ms);

        let expired: Vec<u32> = self
            .reassembly
            .iter()
            .filter(|(_, state)| state.is_expired(now_ms))
            .map(|(id, _)| *id)
            .collect();

        for message_id in &expired {
            if let Some(state) = self.reassembly.remove(message_id) {
                self.pending_bytes = self.pending_bytes.saturating_sub(state.total_length());
                debug!(
                    session_id = %self.id,
                    message_id = message_id,
                    received_bytes = state.received_bytes(),
                    "Reassembly timed out"
                );
            }
        }
        expired
    }

    /// Register a message subscriber.
    pub fn subscribe(&mut self, callback: MessageCallback) -> SubscriberId {
        self.observers.subscribe(callback)
    }

    /// Remove a message subscriber by handle.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Close the session, dropping reassembly state and subscribers.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reassembly.clear();
        self.completed.clear();
        self.pending_bytes = 0;
        self.observers.clear();
    }

    /// Whether the session is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl MessageChannel for Session {
    fn id(&self) -> SessionId {
        Session::id(self)
    }

    fn send_message(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        Session::send_message(self, payload)
    }

    fn on_datagram(&mut self, datagram: &[u8], now_ms: u64) -> Result<bool, SessionError> {
        Ok(self.on_frame(datagram, now_ms))
    }

    fn subscribe(&mut self, callback: MessageCallback) -> SubscriberId {
        Session::subscribe(self, callback)
    }

    fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        Session::unsubscribe(self, id)
    }

    fn evict_expired(&mut self, now_ms: u64) -> Vec<u32> {
        Session::evict_expired(self, now_ms)
    }

    fn close(&mut self) {
        Session::close(self)
    }

    fn is_closed(&self) -> bool {
        Session::is_closed(self)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("id_adopted", &self.id_adopted)
            .field("outgoing_message_counter", &self.outgoing_message_counter)
            .field("pending", &self.reassembly.len())
            .field("observers", &self.observers)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
