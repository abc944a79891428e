//! First-hop peer configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use super::ConfigError;

/// A well-known peer to seed the first-hop registry (`first_hops[]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstHopConfig {
    /// UDP address of the peer (`address`), e.g. "203.0.113.7:4000".
    pub address: String,

    /// The peer's key thumbprint (`thumbprint`).
    pub thumbprint: String,

    /// SPKI PEM public key of the peer (`public_key_file`). Without it the
    /// peer is recorded but cannot be handshaken with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_file: Option<PathBuf>,
}

impl FirstHopConfig {
    /// Create a first hop entry.
    pub fn new(address: impl Into<String>, thumbprint: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            thumbprint: thumbprint.into(),
            public_key_file: None,
        }
    }

    /// Attach the peer's public key file.
    pub fn with_public_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_key_file = Some(path.into());
        self
    }

    /// Parse the configured address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "first_hops.address",
                value: self.address.clone(),
            })
    }
}
