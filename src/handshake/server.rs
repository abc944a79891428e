//! Server side of the handshake.

use super::{HandshakeConfirm, HandshakeError, HandshakeInit, NONCE_SIZE};
use crate::cipher::FrameCipher;
use crate::identity::Identity;
use crate::utils::index::SessionId;

/// Decrypt and parse the first datagram of an accepted session.
pub fn accept_init(identity: &Identity, datagram: &[u8]) -> Result<HandshakeInit, HandshakeError> {
    let plaintext = identity
        .decrypt(datagram)
        .map_err(|_| HandshakeError::Decryption)?;
    HandshakeInit::decode(&plaintext)
}

/// The encrypted confirmation datagram for an accepted proposal.
pub fn confirm_datagram(
    cipher: &FrameCipher,
    nonce: [u8; NONCE_SIZE],
    session_id: SessionId,
) -> Result<Vec<u8>, HandshakeError> {
    let confirm = HandshakeConfirm { nonce, session_id };
    cipher
        .encrypt(&confirm.encode())
        .map_err(|e| HandshakeError::Encryption(e.to_string()))
}
