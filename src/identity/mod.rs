//! Node Identity
//!
//! Every node owns an RSA key pair. Peers address a node's key by its
//! thumbprint: the lowercase hex SHA-256 digest of the SPKI DER encoding
//! of the public key. Handshake proposals are RSA-OAEP (SHA-256)
//! encrypted to the destination's public key, so only the holder of the
//! matching private key can recover the session key.

mod local;
mod peer;

use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

pub use local::Identity;
pub use peer::PeerKey;

/// Length of a thumbprint string (hex SHA-256).
pub const THUMBPRINT_LEN: usize = 64;

/// Errors that can occur in identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("rsa error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("private key encoding error: {0}")]
    Pkcs8(#[from] rsa::pkcs8::Error),

    #[error("public key encoding error: {0}")]
    Spki(#[from] rsa::pkcs8::spki::Error),

    #[error("failed to read key file {path}: {source}")]
    ReadKey {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write key file {path}: {source}")]
    WriteKey {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("plaintext too long for key: {len} > {max}")]
    PlaintextTooLong { len: usize, max: usize },
}

/// Compute the thumbprint of a public key.
pub fn thumbprint(public_key: &RsaPublicKey) -> Result<String, IdentityError> {
    let der = public_key.to_public_key_der()?;
    Ok(hex::encode(Sha256::digest(der.as_bytes())))
}

/// Whether `s` has the shape of a thumbprint.
pub fn is_thumbprint(s: &str) -> bool {
    s.len() == THUMBPRINT_LEN && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}


#[cfg(test)]
mod tests;
