//! Keep-alive and opcode dispatch.
//!
//! The first byte of every decrypted application message is an opcode.
//! The dispatcher maps opcodes to handlers that decide what the
//! multiplexer does with the message: reply on the same session, report
//! a keep-alive, drop it, or hand it to the application.

use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// Message opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Request the public key for a thumbprint.
    RequestPublicKey = 0,
    /// Deliver a public key.
    SendPublicKey = 1,
    /// Connect to the node with a given thumbprint.
    ConnectToNode = 2,
    /// Response to an open-session request.
    OpenSessionResponse = 3,
    /// Relay a raw packet.
    RelayPacket = 4,
    /// Keep-alive request.
    Ping = 5,
    /// Keep-alive response.
    Pong = 6,
}

impl Opcode {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Opcode::RequestPublicKey),
            1 => Some(Opcode::SendPublicKey),
            2 => Some(Opcode::ConnectToNode),
            3 => Some(Opcode::OpenSessionResponse),
            4 => Some(Opcode::RelayPacket),
            5 => Some(Opcode::Ping),
            6 => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Whether this opcode is reserved for overlay routing.
    pub fn is_reserved(self) -> bool {
        (self as u8) <= Opcode::RelayPacket as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::RequestPublicKey => "RequestPublicKey",
            Opcode::SendPublicKey => "SendPublicKey",
            Opcode::ConnectToNode => "ConnectToNode",
            Opcode::OpenSessionResponse => "OpenSessionResponse",
            Opcode::RelayPacket => "RelayPacket",
            Opcode::Ping => "Ping",
            Opcode::Pong => "Pong",
        };
        write!(f, "{}", name)
    }
}

/// The single-byte ping message.
pub const PING: [u8; 1] = [Opcode::Ping as u8];

/// The single-byte pong message.
pub const PONG: [u8; 1] = [Opcode::Pong as u8];

/// What to do with a dispatched message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Send this message back on the same session.
    Reply(Vec<u8>),
    /// A keep-alive answer arrived.
    Pong,
    /// Hand the whole message to the application.
    Deliver,
    /// Consume silently.
    Ignore,
}

/// Opcode handler. Receives the message body after the opcode byte.
pub type Handler = Box<dyn Fn(&[u8]) -> Action + Send + Sync>;

/// Opcode table.
pub struct Dispatcher {
    handlers: HashMap<u8, Handler>,
}

impl Dispatcher {
    /// An empty table: every message is delivered to the application.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `opcode`, replacing any previous one.
    pub fn register(&mut self, opcode: u8, handler: Handler) -> Option<Handler> {
        self.handlers.insert(opcode, handler)
    }

    /// Remove the handler for `opcode`.
    pub fn unregister(&mut self, opcode: u8) -> Option<Handler> {
        self.handlers.remove(&opcode)
    }

    /// Whether a handler is registered for `opcode`.
    pub fn handles(&self, opcode: u8) -> bool {
        self.handlers.contains_key(&opcode)
    }

    /// Decide what to do with one application message.
    ///
    /// Empty messages and unregistered opcodes are delivered.
    pub fn dispatch(&self, message: &[u8]) -> Action {
        let (opcode, body) = match message.split_first() {
            Some(parts) => parts,
            None => return Action::Deliver,
        };
        match self.handlers.get(opcode) {
            Some(handler) => handler(body),
            None => Action::Deliver,
        }
    }
}

impl Default for Dispatcher {
    /// Keep-alive handlers plus stubs for the reserved routing opcodes.
    fn default() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register(Opcode::Ping.to_byte(), Box::new(|_: &[u8]| Action::Reply(PONG.to_vec())));
        dispatcher.register(Opcode::Pong.to_byte(), Box::new(|_: &[u8]| Action::Pong));
        for opcode in [
            Opcode::RequestPublicKey,
            Opcode::SendPublicKey,
            Opcode::ConnectToNode,
            Opcode::OpenSessionResponse,
            Opcode::RelayPacket,
        ] {
            dispatcher.register(
                opcode.to_byte(),
                Box::new(move |body: &[u8]| {
                    trace!(opcode = %opcode, bytes = body.len(), "Reserved opcode, ignoring");
                    Action::Ignore
                }),
            );
        }
        dispatcher
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut opcodes: Vec<u8> = self.handlers.keys().copied().collect();
        opcodes.sort_unstable();
        f.debug_struct("Dispatcher").field("opcodes", &opcodes).finish()
    }
}
