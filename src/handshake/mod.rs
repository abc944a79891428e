//! Session Handshake
//!
//! Upgrades a cleartext session to an encrypted one. The client draws a
//! 4-byte nonce and a 32-byte AES key, RSA-OAEP encrypts them to the
//! server's public key and sends the result as one raw datagram. The
//! server answers with an AES-encrypted confirmation echoing the nonce and
//! carrying the session id it assigned, which the client adopts.
//!
//! ## Wire Format
//!
//! Both payloads start with the common frame prefix, the nonce sitting in
//! the message-id slot:
//!
//! ```text
//! init    (RSA-OAEP):  [nonce:4][0x00][thumbprint][0x00][key:32][0x01]
//!                      [nonce:4][0x00][key:32][0x01]      (anonymous)
//! confirm (AES-CBC):   [nonce:4][0x01][session_id:2 LE]   zero-padded to 16
//! ```
//!
//! The server infers whether a thumbprint is present from the payload
//! length: exactly 38 bytes means the client asked for anonymity.

mod client;
mod server;

use crate::cipher::{SymmetricKey, KEY_SIZE};
use crate::identity::IdentityError;
use crate::session::wire::{FrameKind, FRAME_PREFIX_SIZE};
use crate::utils::index::SessionId;
use rand::RngCore;
use thiserror::Error;

pub use client::ClientHandshake;
pub use server::{accept_init, confirm_datagram};

/// Size of the handshake nonce.
pub const NONCE_SIZE: usize = 4;

/// Size of an anonymous init payload.
pub const ANONYMOUS_INIT_SIZE: usize = FRAME_PREFIX_SIZE + KEY_SIZE + 1;

/// Size of the confirm payload before padding.
pub const CONFIRM_SIZE: usize = FRAME_PREFIX_SIZE + 2;

/// Trailing byte of every init payload.
const INIT_TRAILER: u8 = 0x01;

/// Errors from the handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake timed out")]
    Timeout,

    #[error("protocol violation: unexpected stage {0}")]
    ProtocolViolation(u8),

    #[error("malformed handshake: {0}")]
    Malformed(String),

    #[error("handshake decryption failed")]
    Decryption,

    #[error("handshake encryption failed: {0}")]
    Encryption(String),

    #[error("session closed during handshake")]
    Closed,
}

impl From<IdentityError> for HandshakeError {
    fn from(e: IdentityError) -> Self {
        HandshakeError::Encryption(e.to_string())
    }
}

/// Draw a fresh handshake nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// The client's proposal, as carried inside the RSA ciphertext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeInit {
    pub nonce: [u8; NONCE_SIZE],
    /// Client key thumbprint; None requests anonymity.
    pub thumbprint: Option<String>,
    pub key: SymmetricKey,
}

impl HandshakeInit {
    /// Encode the plaintext init payload.
    ///
    /// An empty thumbprint string is treated as anonymous.
    pub fn encode(&self) -> Vec<u8> {
        let thumbprint = self.thumbprint.as_deref().filter(|t| !t.is_empty());
        let thumb_len = thumbprint.map_or(0, |t| t.len() + 1);

        let mut buf = Vec::with_capacity(ANONYMOUS_INIT_SIZE + thumb_len);
        buf.extend_from_slice(&self.nonce);
        buf.push(FrameKind::HandshakeInit.as_byte());
        if let Some(t) = thumbprint {
            buf.extend_from_slice(t.as_bytes());
            buf.push(0);
        }
        buf.extend_from_slice(self.key.as_bytes());
        buf.push(INIT_TRAILER);
        buf
    }

    /// Decode a plaintext init payload.
    ///
    /// A stage byte other than 0 is a protocol violation. The thumbprint
    /// region must be zero-terminated UTF-8 with no interior zero byte.
    pub fn decode(plaintext: &[u8]) -> Result<Self, HandshakeError> {
        if plaintext.len() < FRAME_PREFIX_SIZE {
            return Err(HandshakeError::Malformed(format!(
                "init payload of {} bytes",
                plaintext.len()
            )));
        }
        let stage = plaintext[4];
        if stage != FrameKind::HandshakeInit.as_byte() {
            return Err(HandshakeError::ProtocolViolation(stage));
        }
        if plaintext.len() < ANONYMOUS_INIT_SIZE {
            return Err(HandshakeError::Malformed(format!(
                "init payload of {} bytes",
                plaintext.len()
            )));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&plaintext[..NONCE_SIZE]);

        let key_start = plaintext.len() - KEY_SIZE - 1;
        let thumbprint = if plaintext.len() == ANONYMOUS_INIT_SIZE {
            None
        } else {
            Some(parse_thumbprint(&plaintext[FRAME_PREFIX_SIZE..key_start])?)
        };

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&plaintext[key_start..key_start + KEY_SIZE]);

        Ok(Self {
            nonce,
            thumbprint,
            key: SymmetricKey::from_bytes(key),
        })
    }
}

fn parse_thumbprint(region: &[u8]) -> Result<String, HandshakeError> {
    let (terminator, body) = match region.split_last() {
        Some(parts) => parts,
        None => return Err(HandshakeError::Malformed("empty thumbprint".into())),
    };
    if *terminator != 0 || body.is_empty() || body.contains(&0) {
        return Err(HandshakeError::Malformed("unterminated thumbprint".into()));
    }
    String::from_utf8(body.to_vec())
        .map_err(|_| HandshakeError::Malformed("thumbprint is not UTF-8".into()))
}

/// The server's confirmation, as carried inside the AES ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandshakeConfirm {
    pub nonce: [u8; NONCE_SIZE],
    pub session_id: SessionId,
}

impl HandshakeConfirm {
    /// Encode the unpadded confirm payload.
    pub fn encode(&self) -> [u8; CONFIRM_SIZE] {
        let mut buf = [0u8; CONFIRM_SIZE];
        buf[..NONCE_SIZE].copy_from_slice(&self.nonce);
        buf[4] = FrameKind::HandshakeConfirm.as_byte();
        buf[5..7].copy_from_slice(&self.session_id.to_le_bytes());
        buf
    }

    /// Decode a (possibly padded) confirm payload.
    pub fn decode(plaintext: &[u8]) -> Option<Self> {
        if plaintext.len() < CONFIRM_SIZE {
            return None;
        }
        if FrameKind::from_byte(plaintext[4]) != Some(FrameKind::HandshakeConfirm) {
            return None;
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&plaintext[..NONCE_SIZE]);
        Some(Self {
            nonce,
            session_id: SessionId::from_le_bytes([plaintext[5], plaintext[6]]),
        })
    }
}

#[cfg(test)]
mod tests;
