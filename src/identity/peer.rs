//! Remote public keys.

use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use std::path::Path;

use super::{thumbprint, IdentityError};

/// OAEP overhead with SHA-256: two digests plus two bytes.
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

/// A peer's public key and its thumbprint.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerKey {
    public_key: RsaPublicKey,
    thumbprint: String,
}

impl PeerKey {
    /// Wrap a public key, deriving its thumbprint.
    pub fn from_public_key(public_key: RsaPublicKey) -> Result<Self, IdentityError> {
        let thumbprint = thumbprint(&public_key)?;
        Ok(Self {
            public_key,
            thumbprint,
        })
    }

    /// Parse an SPKI PEM public key.
    pub fn from_pem(pem: &str) -> Result<Self, IdentityError> {
        Self::from_public_key(RsaPublicKey::from_public_key_pem(pem)?)
    }

    /// Read an SPKI PEM public key from a file.
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let pem = std::fs::read_to_string(path).map_err(|e| IdentityError::ReadKey {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_pem(&pem)
    }

    /// Encode the public key as SPKI PEM.
    pub fn to_pem(&self) -> Result<String, IdentityError> {
        Ok(self.public_key.to_public_key_pem(LineEnding::LF)?)
    }

    /// The RSA public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Hex SHA-256 of the SPKI DER encoding.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Largest plaintext `encrypt` accepts for this key.
    pub fn max_plaintext_len(&self) -> usize {
        self.public_key.size().saturating_sub(OAEP_SHA256_OVERHEAD)
    }

    /// RSA-OAEP (SHA-256) encrypt `plaintext` to this key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, IdentityError> {
        let max = self.max_plaintext_len();
        if plaintext.len() > max {
            return Err(IdentityError::PlaintextTooLong {
                len: plaintext.len(),
                max,
            });
        }
        Ok(self
            .public_key
            .encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha256>(), plaintext)?)
    }
}

impl fmt::Debug for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerKey")
            .field("thumbprint", &self.thumbprint)
            .finish()
    }
}
