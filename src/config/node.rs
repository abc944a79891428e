//! Node configuration subsections.
//!
//! All the `node.*` configuration parameters: identity key material,
//! session timing, symmetric cipher policy and the startup self-check.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cipher::IvMode;
use crate::session::{DEFAULT_MAX_PENDING_BYTES, DEFAULT_MAX_PENDING_MESSAGES};

/// Default RSA modulus size for generated identities.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Identity configuration (`node.identity.*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// PKCS#8 PEM private key (`node.identity.key_file`).
    /// Generated and written here when the file does not exist. When
    /// unset, a fresh in-memory key is generated on every start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Modulus size for generated keys (`node.identity.key_bits`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_bits: Option<usize>,
}

impl IdentityConfig {
    /// Get the key size, using default if not configured.
    pub fn key_bits(&self) -> usize {
        self.key_bits.unwrap_or(DEFAULT_KEY_BITS)
    }

    fn merge(&mut self, other: IdentityConfig) {
        if other.key_file.is_some() {
            self.key_file = other.key_file;
        }
        if other.key_bits.is_some() {
            self.key_bits = other.key_bits;
        }
    }
}

/// Session timing (`node.session.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Client handshake deadline in milliseconds (`node.session.handshake_timeout_ms`).
    #[serde(default = "SessionConfig::default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Lifetime of an incomplete inbound message (`node.session.reassembly_timeout_ms`).
    #[serde(default = "SessionConfig::default_reassembly_timeout_ms")]
    pub reassembly_timeout_ms: u64,
    /// Multiplexer tick driving deadlines and expiry (`node.session.tick_interval_ms`).
    #[serde(default = "SessionConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Capacity of the multiplexer event channel (`node.session.event_buffer`).
    #[serde(default = "SessionConfig::default_event_buffer")]
    pub event_buffer: usize,
    /// Messages one session may reassemble at once (`node.session.max_pending_messages`).
    #[serde(default = "SessionConfig::default_max_pending_messages")]
    pub max_pending_messages: usize,
    /// Buffer bytes one session may reserve for reassembly (`node.session.max_pending_bytes`).
    #[serde(default = "SessionConfig::default_max_pending_bytes")]
    pub max_pending_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 2_000,
            reassembly_timeout_ms: 30_000,
            tick_interval_ms: 100,
            event_buffer: 256,
            max_pending_messages: DEFAULT_MAX_PENDING_MESSAGES,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
        }
    }
}

impl SessionConfig {
    fn default_handshake_timeout_ms() -> u64 { 2_000 }
    fn default_reassembly_timeout_ms() -> u64 { 30_000 }
    fn default_tick_interval_ms() -> u64 { 100 }
    fn default_event_buffer() -> usize { 256 }
    fn default_max_pending_messages() -> usize { DEFAULT_MAX_PENDING_MESSAGES }
    fn default_max_pending_bytes() -> usize { DEFAULT_MAX_PENDING_BYTES }
}

/// Symmetric cipher policy (`node.crypto.*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// CBC IV selection (`node.crypto.iv_mode`).
    #[serde(default)]
    pub iv_mode: IvMode,
}

/// Node configuration (`node.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identity key material (`node.identity.*`).
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Session timing (`node.session.*`).
    #[serde(default)]
    pub session: SessionConfig,

    /// Cipher policy (`node.crypto.*`).
    #[serde(default)]
    pub crypto: CryptoConfig,

    /// Connect to our own public endpoints on startup (`node.loopback_check`).
    #[serde(default = "NodeConfig::default_loopback_check")]
    pub loopback_check: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            session: SessionConfig::default(),
            crypto: CryptoConfig::default(),
            loopback_check: true,
        }
    }
}

impl NodeConfig {
    fn default_loopback_check() -> bool { true }

    /// Merge another node section into this one.
    ///
    /// Identity fields override individually; the other sections replace
    /// ours whenever they differ from their defaults.
    pub(crate) fn merge(&mut self, other: NodeConfig) {
        self.identity.merge(other.identity);
        if other.session != SessionConfig::default() {
            self.session = other.session;
        }
        if other.crypto != CryptoConfig::default() {
            self.crypto = other.crypto;
        }
        if !other.loopback_check {
            self.loopback_check = false;
        }
    }
}
