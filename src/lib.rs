//! Free Speech: peer-to-peer encrypted session transport
//!
//! A node exposes a cleartext UDP transport, upgrades each peer
//! relationship to an encrypted session through an RSA key-transport
//! handshake, and exchanges arbitrarily large messages by fragmenting them
//! into bounded datagrams and reassembling them at the receiver.

pub mod cipher;
pub mod config;
pub mod dispatch;
pub mod handshake;
pub mod identity;
pub mod mux;
pub mod node;
pub mod session;
pub mod store;
pub mod transport;
pub mod utils;

// Re-export identity types
pub use identity::{thumbprint, Identity, IdentityError, PeerKey};

// Re-export config types
pub use config::{Config, ConfigError, FirstHopConfig, NodeConfig, SessionConfig, UdpConfig};

// Re-export cipher types
pub use cipher::{CipherError, FrameCipher, IvMode, SymmetricKey};

// Re-export session types
pub use session::{EncryptedSession, MessageChannel, Session, SessionError};
pub use utils::index::{IndexError, SessionId, SessionIdAllocator};

// Re-export transport types
pub use transport::udp::UdpTransport;
pub use transport::{packet_channel, DatagramSink, PacketRx, PacketTx, ReceivedPacket, TransportError};

// Re-export handshake and dispatch types
pub use dispatch::{Action, Dispatcher, Opcode};
pub use handshake::{ClientHandshake, HandshakeError};

// Re-export multiplexer types
pub use mux::{
    Multiplexer, MultiplexerHandle, MuxConfig, MuxError, MuxEvent, Origin, Phase, Role, SessionInfo,
};

// Re-export node and store types
pub use node::{Node, NodeError, NodeEvent};
pub use store::{FirstHop, KeyStore, KnownPeer, MemoryStore, PeerRegistry, Store};
