//! Symmetric Frame Cipher
//!
//! AES-256-CBC used by established sessions. Plaintext is zero-padded up
//! to the next 16-byte boundary before encryption, so every ciphertext is
//! a whole number of blocks. The frame layer above tolerates the trailing
//! zeros because fragment headers carry the true message length.
//!
//! ## IV Modes
//!
//! ```text
//!   random:       [iv:16][ciphertext:16n]     fresh IV per datagram
//!   key_derived:  [ciphertext:16n]            IV = first 16 key bytes
//! ```
//!
//! `key_derived` reproduces the legacy wire format. It reuses one IV for
//! every datagram under a key, which leaks equality of leading blocks, so
//! `random` is the default.

use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Symmetric key size (AES-256).
pub const KEY_SIZE: usize = 32;

/// AES block size.
pub const BLOCK_SIZE: usize = 16;

/// Errors from symmetric encryption.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("ciphertext length {0} is not a multiple of the block size")]
    InvalidLength(usize),

    #[error("ciphertext too short: expected at least {expected}, got {got}")]
    TooShort { expected: usize, got: usize },

    #[error("cipher initialisation failed")]
    InvalidKey,
}

/// How the CBC initialisation vector is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IvMode {
    /// Fresh random IV, transmitted in front of the ciphertext.
    #[default]
    Random,
    /// IV taken from the key material; nothing transmitted.
    KeyDerived,
}

impl fmt::Display for IvMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IvMode::Random => write!(f, "random"),
            IvMode::KeyDerived => write!(f, "key_derived"),
        }
    }
}

/// A 256-bit session key.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Draw a fresh key from the OS random source.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn derived_iv(&self) -> [u8; BLOCK_SIZE] {
        let mut iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&self.0[..BLOCK_SIZE]);
        iv
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([redacted])")
    }
}

/// Zero-pad `data` up to the next block boundary (at least one block).
pub fn zero_pad(data: &[u8]) -> Vec<u8> {
    let padded_len = data.len().div_ceil(BLOCK_SIZE).max(1) * BLOCK_SIZE;
    let mut buf = vec![0u8; padded_len];
    buf[..data.len()].copy_from_slice(data);
    buf
}

/// AES-256-CBC cipher bound to one session key.
#[derive(Clone)]
pub struct FrameCipher {
    key: SymmetricKey,
    iv_mode: IvMode,
}

impl FrameCipher {
    /// Create a cipher for a session key.
    pub fn new(key: SymmetricKey, iv_mode: IvMode) -> Self {
        Self { key, iv_mode }
    }

    /// The session key.
    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// The IV mode in use.
    pub fn iv_mode(&self) -> IvMode {
        self.iv_mode
    }

    /// Zero-pad and encrypt one datagram payload.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let padded = zero_pad(plaintext);

        match self.iv_mode {
            IvMode::KeyDerived => self.encrypt_blocks(&self.key.derived_iv(), &padded),
            IvMode::Random => {
                let mut iv = [0u8; BLOCK_SIZE];
                rand::rngs::OsRng.fill_bytes(&mut iv);
                let body = self.encrypt_blocks(&iv, &padded)?;
                let mut out = Vec::with_capacity(BLOCK_SIZE + body.len());
                out.extend_from_slice(&iv);
                out.extend_from_slice(&body);
                Ok(out)
            }
        }
    }

    /// Decrypt one datagram payload. Padding is left in place.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CipherError::InvalidLength(ciphertext.len()));
        }

        match self.iv_mode {
            IvMode::KeyDerived => {
                if ciphertext.is_empty() {
                    return Err(CipherError::TooShort {
                        expected: BLOCK_SIZE,
                        got: 0,
                    });
                }
                self.decrypt_blocks(&self.key.derived_iv(), ciphertext)
            }
            IvMode::Random => {
                if ciphertext.len() < 2 * BLOCK_SIZE {
                    return Err(CipherError::TooShort {
                        expected: 2 * BLOCK_SIZE,
                        got: ciphertext.len(),
                    });
                }
                let (iv, body) = ciphertext.split_at(BLOCK_SIZE);
                self.decrypt_blocks(iv, body)
            }
        }
    }

    fn encrypt_blocks(&self, iv: &[u8], padded: &[u8]) -> Result<Vec<u8>, CipherError> {
        let cipher = Aes256CbcEnc::new_from_slices(self.key.as_bytes(), iv)
            .map_err(|_| CipherError::InvalidKey)?;
        Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(padded))
    }

    fn decrypt_blocks(&self, iv: &[u8], body: &[u8]) -> Result<Vec<u8>, CipherError> {
        let cipher = Aes256CbcDec::new_from_slices(self.key.as_bytes(), iv)
            .map_err(|_| CipherError::InvalidKey)?;
        cipher
            .decrypt_padded_vec_mut::<NoPadding>(body)
            .map_err(|_| CipherError::InvalidLength(body.len()))
    }
}

impl fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCipher")
            .field("iv_mode", &self.iv_mode)
            .field("key", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_pad() {
        assert_eq!(zero_pad(&[]).len(), 16);
        assert_eq!(zero_pad(&[1; 16]).len(), 16);
        assert_eq!(zero_pad(&[1; 17]).len(), 32);

        let padded = zero_pad(&[4, 3, 2, 1, 1, 7, 0]);
        assert_eq!(padded.len(), 16);
        assert_eq!(&padded[..7], &[4, 3, 2, 1, 1, 7, 0]);
        assert!(padded[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_key_derived_roundtrip() {
        let cipher = FrameCipher::new(SymmetricKey::generate(), IvMode::KeyDerived);
        let plaintext = b"hello encrypted world";

        let ciphertext = cipher.encrypt(plaintext).unwrap();
        assert_eq!(ciphertext.len(), 32);

        let decrypted = cipher.decrypt(&ciphertext).unwrap();
        assert_eq!(&decrypted[..plaintext.len()], plaintext);
        assert!(decrypted[plaintext.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_key_derived_is_deterministic() {
        let cipher = FrameCipher::new(SymmetricKey::from_bytes([9; 32]), IvMode::KeyDerived);
        assert_eq!(cipher.encrypt(b"same").unwrap(), cipher.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_random_iv_roundtrip() {
        let cipher = FrameCipher::new(SymmetricKey::generate(), IvMode::Random);
        let plaintext = vec![0xabu8; 100];

        let c1 = cipher.encrypt(&plaintext).unwrap();
        let c2 = cipher.encrypt(&plaintext).unwrap();
        assert_eq!(c1.len(), 16 + 112);
        assert_eq!(c1.len() % BLOCK_SIZE, 0);
        assert_ne!(c1, c2);

        let decrypted = cipher.decrypt(&c1).unwrap();
        assert_eq!(&decrypted[..100], &plaintext[..]);
    }

    #[test]
    fn test_wrong_key_does_not_recover_plaintext() {
        let a = FrameCipher::new(SymmetricKey::from_bytes([1; 32]), IvMode::KeyDerived);
        let b = FrameCipher::new(SymmetricKey::from_bytes([2; 32]), IvMode::KeyDerived);

        let ciphertext = a.encrypt(b"secret payload!!").unwrap();
        let garbage = b.decrypt(&ciphertext).unwrap();
        assert_ne!(&garbage[..], b"secret payload!!");
    }

    #[test]
    fn test_decrypt_rejects_bad_lengths() {
        let cipher = FrameCipher::new(SymmetricKey::generate(), IvMode::Random);
        assert_eq!(cipher.decrypt(&[0u8; 17]), Err(CipherError::InvalidLength(17)));
        assert!(matches!(
            cipher.decrypt(&[0u8; 16]),
            Err(CipherError::TooShort { expected: 32, got: 16 })
        ));

        let legacy = FrameCipher::new(SymmetricKey::generate(), IvMode::KeyDerived);
        assert!(matches!(legacy.decrypt(&[]), Err(CipherError::TooShort { .. })));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = SymmetricKey::from_bytes([0x42; 32]);
        assert!(!format!("{:?}", key).contains("42"));
        let cipher = FrameCipher::new(key, IvMode::Random);
        assert!(format!("{:?}", cipher).contains("redacted"));
    }
}
