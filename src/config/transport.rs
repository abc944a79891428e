//! Transport configuration types.

use serde::{Deserialize, Serialize};

/// Default UDP bind address (all interfaces, ephemeral port).
const DEFAULT_UDP_BIND_ADDR: &str = "0.0.0.0:0";

/// Default UDP receive buffer size.
const DEFAULT_UDP_RECV_BUF: usize = 65_536;

/// UDP transport configuration.
///
/// Every multiplexer binds one socket from this template; public
/// endpoints and the client multiplexer override only the port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UdpConfig {
    /// Bind address (`bind_addr`). Defaults to "0.0.0.0:0".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,

    /// Receive buffer size in bytes (`recv_buf_size`). Defaults to 64 KB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recv_buf_size: Option<usize>,
}

impl UdpConfig {
    /// Get the bind address, using default if not configured.
    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_deref().unwrap_or(DEFAULT_UDP_BIND_ADDR)
    }

    /// Get the receive buffer size, using default if not configured.
    pub fn recv_buf_size(&self) -> usize {
        self.recv_buf_size.unwrap_or(DEFAULT_UDP_RECV_BUF)
    }
}

/// Transports configuration section (`transports.*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportsConfig {
    /// UDP socket template (`transports.udp`).
    #[serde(default, skip_serializing_if = "is_udp_default")]
    pub udp: UdpConfig,
}

fn is_udp_default(udp: &UdpConfig) -> bool {
    *udp == UdpConfig::default()
}

impl TransportsConfig {
    /// Check if anything beyond the defaults is configured.
    pub fn is_empty(&self) -> bool {
        is_udp_default(&self.udp)
    }

    /// Merge another TransportsConfig into this one.
    ///
    /// Fields set in `other` replace those in `self`.
    pub fn merge(&mut self, other: TransportsConfig) {
        if other.udp.bind_addr.is_some() {
            self.udp.bind_addr = other.udp.bind_addr;
        }
        if other.udp.recv_buf_size.is_some() {
            self.udp.recv_buf_size = other.udp.recv_buf_size;
        }
    }
}
