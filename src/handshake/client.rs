//! Client side of the handshake.

use super::{generate_nonce, HandshakeConfirm, HandshakeError, HandshakeInit, NONCE_SIZE};
use crate::cipher::{FrameCipher, IvMode, SymmetricKey};
use crate::identity::PeerKey;
use crate::utils::index::SessionId;
use std::fmt;

/// Pending client handshake: the proposal sent and the key to verify the
/// confirmation with.
///
/// The client encrypts the server's reply with the key it proposed, so
/// anything that does not decrypt to a confirmation echoing our nonce is
/// noise and is ignored rather than failing the handshake.
pub struct ClientHandshake {
    init: HandshakeInit,
    cipher: FrameCipher,
}

impl ClientHandshake {
    /// Start a handshake with a fresh nonce and key.
    ///
    /// `thumbprint` authenticates the client; None requests anonymity.
    pub fn new(thumbprint: Option<String>, iv_mode: IvMode) -> Self {
        Self::with_parts(generate_nonce(), SymmetricKey::generate(), thumbprint, iv_mode)
    }

    /// Start a handshake from explicit material.
    pub fn with_parts(
        nonce: [u8; NONCE_SIZE],
        key: SymmetricKey,
        thumbprint: Option<String>,
        iv_mode: IvMode,
    ) -> Self {
        let cipher = FrameCipher::new(key.clone(), iv_mode);
        Self {
            init: HandshakeInit {
                nonce,
                thumbprint,
                key,
            },
            cipher,
        }
    }

    /// The nonce the server must echo.
    pub fn nonce(&self) -> [u8; NONCE_SIZE] {
        self.init.nonce
    }

    /// Whether this handshake authenticates the client.
    pub fn is_anonymous(&self) -> bool {
        self.init.thumbprint.as_deref().map_or(true, str::is_empty)
    }

    /// The RSA-encrypted init datagram for `server`.
    pub fn init_datagram(&self, server: &PeerKey) -> Result<Vec<u8>, HandshakeError> {
        Ok(server.encrypt(&self.init.encode())?)
    }

    /// Check an inbound datagram for the server's confirmation.
    ///
    /// Returns the server-assigned session id on a match.
    pub fn accept_confirm(&self, datagram: &[u8]) -> Option<SessionId> {
        let plaintext = self.cipher.decrypt(datagram).ok()?;
        let confirm = HandshakeConfirm::decode(&plaintext)?;
        (confirm.nonce == self.init.nonce).then_some(confirm.session_id)
    }

    /// The agreed session cipher.
    pub fn into_cipher(self) -> FrameCipher {
        self.cipher
    }
}

impl fmt::Debug for ClientHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandshake")
            .field("nonce", &hex::encode(self.init.nonce))
            .field("anonymous", &self.is_anonymous())
            .finish()
    }
}
