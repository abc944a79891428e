//! Local node identity with decryption capability.

use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use std::path::Path;
use tracing::info;

use super::{thumbprint, IdentityError, PeerKey};

/// A node identity: an RSA private key and its derived thumbprint.
#[derive(Clone)]
pub struct Identity {
    private_key: RsaPrivateKey,
    public: PeerKey,
}

impl Identity {
    /// Generate a fresh key pair with a `bits`-bit modulus.
    pub fn generate(bits: usize) -> Result<Self, IdentityError> {
        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)?;
        Self::from_private_key(private_key)
    }

    /// Create an identity from an existing private key.
    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, IdentityError> {
        let public = PeerKey::from_public_key(RsaPublicKey::from(&private_key))?;
        Ok(Self {
            private_key,
            public,
        })
    }

    /// Parse a PKCS#8 PEM private key.
    pub fn from_pem(pem: &str) -> Result<Self, IdentityError> {
        Self::from_private_key(RsaPrivateKey::from_pkcs8_pem(pem)?)
    }

    /// Encode the private key as PKCS#8 PEM.
    pub fn to_pem(&self) -> Result<String, IdentityError> {
        let pem = self.private_key.to_pkcs8_pem(LineEnding::LF)?;
        Ok(pem.as_str().to_owned())
    }

    /// Load the key at `path`, or generate one and write it there.
    ///
    /// Returns the identity and whether it was freshly generated.
    pub fn load_or_generate(path: &Path, bits: usize) -> Result<(Self, bool), IdentityError> {
        if path.exists() {
            let pem = std::fs::read_to_string(path).map_err(|e| IdentityError::ReadKey {
                path: path.to_path_buf(),
                source: e,
            })?;
            return Ok((Self::from_pem(&pem)?, false));
        }

        let identity = Self::generate(bits)?;
        let write_err = |e| IdentityError::WriteKey {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, identity.to_pem()?).map_err(write_err)?;
        info!(path = %path.display(), thumbprint = %identity.thumbprint(), "Generated identity key");
        Ok((identity, true))
    }

    /// The public half, as peers see it.
    pub fn peer_key(&self) -> &PeerKey {
        &self.public
    }

    /// The public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        self.public.public_key()
    }

    /// The thumbprint of this identity's public key.
    pub fn thumbprint(&self) -> &str {
        self.public.thumbprint()
    }

    /// Decrypt an RSA-OAEP (SHA-256) ciphertext addressed to this identity.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, IdentityError> {
        Ok(self.private_key.decrypt(Oaep::new::<Sha256>(), ciphertext)?)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("thumbprint", &self.thumbprint())
            .finish_non_exhaustive()
    }
}
