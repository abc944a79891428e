//! Transport Layer
//!
//! The cleartext datagram transport beneath sessions. A transport delivers
//! raw datagrams tagged with the sender's socket address to its owner over
//! a packet channel, and hands out `DatagramSink`s that sessions use to
//! transmit to one remote peer.

pub mod udp;

use crate::utils::now_ms;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

// ============================================================================
// Packet Channel Types
// ============================================================================

/// A datagram received from a transport.
#[derive(Clone, Debug)]
pub struct ReceivedPacket {
    /// Remote peer address.
    pub remote_addr: SocketAddr,
    /// Datagram bytes.
    pub data: Vec<u8>,
    /// Receipt timestamp (Unix milliseconds).
    pub timestamp_ms: u64,
}

impl ReceivedPacket {
    /// Create a new received packet with current timestamp.
    pub fn new(remote_addr: SocketAddr, data: Vec<u8>) -> Self {
        Self {
            remote_addr,
            data,
            timestamp_ms: now_ms(),
        }
    }

    /// Create a received packet with explicit timestamp.
    pub fn with_timestamp(remote_addr: SocketAddr, data: Vec<u8>, timestamp_ms: u64) -> Self {
        Self {
            remote_addr,
            data,
            timestamp_ms,
        }
    }
}

/// Channel sender for received packets.
pub type PacketTx = tokio::sync::mpsc::Sender<ReceivedPacket>;

/// Channel receiver for received packets.
pub type PacketRx = tokio::sync::mpsc::Receiver<ReceivedPacket>;

/// Create a packet channel with the given buffer size.
pub fn packet_channel(buffer: usize) -> (PacketTx, PacketRx) {
    tokio::sync::mpsc::channel(buffer)
}

// ============================================================================
// Datagram Sink
// ============================================================================

/// Outbound path of a session: transmits datagrams to one fixed peer.
pub trait DatagramSink: Send {
    /// Transmit one datagram. Delivery is not guaranteed.
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), TransportError>;
}

impl<F> DatagramSink for F
where
    F: FnMut(&[u8]) -> Result<(), TransportError> + Send,
{
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), TransportError> {
        self(datagram)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors related to transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not started")]
    NotStarted,

    #[error("transport already started")]
    AlreadyStarted,

    #[error("transport failed to start: {0}")]
    StartFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("datagram too large: {size} > {max}")]
    DatagramTooLarge { size: usize, max: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Transport State
// ============================================================================

/// Transport lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    /// Configured but not started.
    Configured,
    /// Initialization in progress.
    Starting,
    /// Socket bound, receive loop running.
    Up,
    /// Was up, now closed.
    Down,
}

impl TransportState {
    /// Check if the transport is operational.
    pub fn is_operational(&self) -> bool {
        matches!(self, TransportState::Up)
    }

    /// Check if the transport can be started.
    pub fn can_start(&self) -> bool {
        matches!(self, TransportState::Configured | TransportState::Down)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportState::Configured => "configured",
            TransportState::Starting => "starting",
            TransportState::Up => "up",
            TransportState::Down => "down",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_state() {
        assert!(TransportState::Configured.can_start());
        assert!(TransportState::Down.can_start());
        assert!(!TransportState::Up.can_start());
        assert!(TransportState::Up.is_operational());
        assert!(!TransportState::Starting.is_operational());
        assert_eq!(TransportState::Up.to_string(), "up");
    }

    #[test]
    fn test_closure_sink() {
        let mut sent = Vec::new();
        {
            let mut sink = |d: &[u8]| -> Result<(), TransportError> {
                sent.push(d.to_vec());
                Ok(())
            };
            sink.send_datagram(b"one").unwrap();
            sink.send_datagram(b"two").unwrap();
        }
        assert_eq!(sent, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_received_packet_timestamp() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let packet = ReceivedPacket::with_timestamp(addr, vec![1, 2], 42);
        assert_eq!(packet.timestamp_ms, 42);
        assert!(ReceivedPacket::new(addr, vec![]).timestamp_ms > 0);
    }
}
