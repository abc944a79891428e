//! UDP Transport Implementation
//!
//! One UDP socket shared by every session of a multiplexer.

use super::{DatagramSink, PacketTx, ReceivedPacket, TransportError, TransportState};
use crate::config::UdpConfig;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// UDP transport.
///
/// Provides connectionless, unreliable datagram delivery over UDP/IP.
/// A single socket serves all peers; sessions are virtual tuples of
/// (socket, remote_addr).
pub struct UdpTransport {
    /// Configuration.
    config: UdpConfig,
    /// Current state.
    state: TransportState,
    /// Non-blocking handle on the bound socket used by sinks (None until started).
    send_socket: Option<Arc<std::net::UdpSocket>>,
    /// Channel for delivering received datagrams to the multiplexer.
    packet_tx: PacketTx,
    /// Receive loop task handle.
    recv_task: Option<JoinHandle<()>>,
    /// Local bound address (after start).
    local_addr: Option<SocketAddr>,
}

impl UdpTransport {
    /// Create a new UDP transport.
    pub fn new(config: UdpConfig, packet_tx: PacketTx) -> Self {
        Self {
            config,
            state: TransportState::Configured,
            send_socket: None,
            packet_tx,
            recv_task: None,
            local_addr: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Get the local bound address (only valid after start).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Start the transport.
    ///
    /// Binds the socket on the configured address, replacing its port with
    /// `port` when given (0 or an unset port lets the OS pick an ephemeral
    /// one), and spawns the receive loop. Returns the bound address.
    pub async fn start_async(&mut self, port: Option<u16>) -> Result<SocketAddr, TransportError> {
        if !self.state.can_start() {
            return Err(TransportError::AlreadyStarted);
        }

        self.state = TransportState::Starting;

        let mut bind_addr: SocketAddr = match self.config.bind_addr().parse() {
            Ok(addr) => addr,
            Err(e) => {
                self.state = TransportState::Configured;
                return Err(TransportError::StartFailed(format!(
                    "invalid bind address: {}",
                    e
                )));
            }
        };
        if let Some(port) = port {
            bind_addr.set_port(port);
        }

        let (socket, send_socket) = match bind_pair(bind_addr) {
            Ok(pair) => pair,
            Err(e) => {
                self.state = TransportState::Configured;
                return Err(TransportError::StartFailed(format!("bind failed: {}", e)));
            }
        };

        let local_addr = socket
            .local_addr()
            .map_err(|e| TransportError::StartFailed(format!("get local addr: {}", e)))?;
        self.local_addr = Some(local_addr);

        let socket = Arc::new(socket);
        self.send_socket = Some(Arc::new(send_socket));

        let packet_tx = self.packet_tx.clone();
        let buf_size = self.config.recv_buf_size();
        let recv_task = tokio::spawn(async move {
            udp_receive_loop(socket, packet_tx, buf_size).await;
        });

        self.recv_task = Some(recv_task);
        self.state = TransportState::Up;

        info!(local_addr = %local_addr, "UDP transport started");

        Ok(local_addr)
    }

    /// Stop the transport, closing the socket.
    pub async fn stop_async(&mut self) -> Result<(), TransportError> {
        if !self.state.is_operational() {
            return Err(TransportError::NotStarted);
        }

        if let Some(task) = self.recv_task.take() {
            task.abort();
            let _ = task.await; // Ignore JoinError from abort
        }

        self.send_socket.take();
        let local_addr = self.local_addr.take();
        self.state = TransportState::Down;

        debug!(local_addr = ?local_addr, "UDP transport stopped");

        Ok(())
    }

    /// Create a sink that transmits to `remote` over this transport's socket.
    pub fn sink_to(&self, remote: SocketAddr) -> Result<UdpSink, TransportError> {
        let socket = self.send_socket.as_ref().ok_or(TransportError::NotStarted)?;
        Ok(UdpSink {
            socket: socket.clone(),
            remote,
        })
    }
}

/// Outbound path of one session over a shared UDP socket.
#[derive(Clone, Debug)]
pub struct UdpSink {
    socket: Arc<std::net::UdpSocket>,
    remote: SocketAddr,
}

impl UdpSink {
    /// The peer this sink transmits to.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl DatagramSink for UdpSink {
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), TransportError> {
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::DatagramTooLarge {
                size: datagram.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }

        send_outcome(self.socket.send_to(datagram, self.remote), self.remote)
    }
}

/// Map the result of a non-blocking send.
///
/// A full socket buffer drops the datagram like the network would, so the
/// remaining fragments of a message still go out. Other errors fail the send.
fn send_outcome(result: io::Result<usize>, remote: SocketAddr) -> Result<(), TransportError> {
    match result {
        Ok(sent) => {
            debug!(remote_addr = %remote, bytes = sent, "UDP datagram sent");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            warn!(remote_addr = %remote, "UDP send buffer full, datagram dropped");
            Ok(())
        }
        Err(e) => Err(TransportError::SendFailed(format!("{}", e))),
    }
}

/// Bind a socket and split it into an async receive half and a
/// non-blocking synchronous send half sharing the same port.
fn bind_pair(addr: SocketAddr) -> std::io::Result<(UdpSocket, std::net::UdpSocket)> {
    let std_socket = std::net::UdpSocket::bind(addr)?;
    std_socket.set_nonblocking(true)?;
    let send_socket = std_socket.try_clone()?;
    Ok((UdpSocket::from_std(std_socket)?, send_socket))
}

/// UDP receive loop - runs as a spawned task.
async fn udp_receive_loop(socket: Arc<UdpSocket>, packet_tx: PacketTx, buf_size: usize) {
    let mut buf = vec![0u8; buf_size.max(MAX_DATAGRAM_SIZE)];

    debug!("UDP receive loop starting");

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, remote_addr)) => {
                let packet = ReceivedPacket::new(remote_addr, buf[..len].to_vec());

                debug!(remote_addr = %remote_addr, bytes = len, "UDP datagram received");

                if packet_tx.send(packet).await.is_err() {
                    info!("Packet channel closed, stopping receive loop");
                    break;
                }
            }
            Err(e) => {
                // Transient errors (e.g. ICMP port unreachable) are expected
                warn!(error = %e, "UDP receive error");
            }
        }
    }

    debug!("UDP receive loop stopped");
}

// ============================================================================
// Tests
// ============================================================================
