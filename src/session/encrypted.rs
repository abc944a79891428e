//! Encrypted session wrapper.

use super::{MessageCallback, MessageChannel, Session, SessionError, SubscriberId};
use crate::cipher::FrameCipher;
use crate::utils::index::SessionId;
use std::fmt;

/// A `Session` whose datagrams are AES-encrypted.
///
/// Outbound messages are framed by the wrapped session, then each frame is
/// padded, encrypted and handed to the session's sink. Inbound datagrams
/// are decrypted and the resulting frame is fed to the wrapped session for
/// reassembly. The wrapper adds no identity of its own.
pub struct EncryptedSession {
    inner: Session,
    cipher: FrameCipher,
}

impl EncryptedSession {
    /// Wrap an established session with its agreed cipher.
    pub fn new(inner: Session, cipher: FrameCipher) -> Self {
        Self { inner, cipher }
    }

    /// The wrapped session.
    pub fn session(&self) -> &Session {
        &self.inner
    }

    /// Mutable access to the wrapped session.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.inner
    }

    /// The session cipher.
    pub fn cipher(&self) -> &FrameCipher {
        &self.cipher
    }

    /// Encrypt a single plaintext and send it as one datagram.
    pub fn send_encrypted(&mut self, plaintext: &[u8]) -> Result<(), SessionError> {
        let ciphertext = self.cipher.encrypt(plaintext)?;
        self.inner.send_datagram(&ciphertext)
    }

    /// Unwrap, discarding the cipher.
    pub fn into_inner(self) -> Session {
        self.inner
    }
}

impl MessageChannel for EncryptedSession {
    fn id(&self) -> SessionId {
        self.inner.id()
    }

    fn send_message(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let frames = self.inner.frame_message(payload)?;
        for frame in frames {
            self.send_encrypted(&frame)?;
        }
        Ok(())
    }

    fn on_datagram(&mut self, datagram: &[u8], now_ms: u64) -> Result<bool, SessionError> {
        if self.inner.is_closed() {
            return Ok(false);
        }
        let frame = self.cipher.decrypt(datagram)?;
        Ok(self.inner.on_frame(&frame, now_ms))
    }

    fn subscribe(&mut self, callback: MessageCallback) -> SubscriberId {
        self.inner.subscribe(callback)
    }

    fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.inner.unsubscribe(id)
    }

    fn evict_expired(&mut self, now_ms: u64) -> Vec<u32> {
        self.inner.evict_expired(now_ms)
    }

    fn close(&mut self) {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl fmt::Debug for EncryptedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedSession")
            .field("session", &self.inner)
            .field("cipher", &self.cipher)
            .finish()
    }
}
