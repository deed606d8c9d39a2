//! Key material.
//!
//! Keys arrive as PEM text: PKCS#8 for the private key, SubjectPublicKeyInfo
//! for the public key. They can also be derived from a caller-supplied
//! 32-byte secret seed. Nothing here generates or rotates keys.

use std::fmt;
use std::path::Path;

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use blackbox_contracts::error::{BlackBoxError, BlackBoxResult};

/// Hex characters kept from the SHA-256 digest in a key fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// A producer's signing key.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Parse a PKCS#8 PEM private key.
    pub fn from_pem(pem: &str) -> BlackBoxResult<Self> {
        let inner = SigningKey::from_pkcs8_pem(pem.trim()).map_err(|e| {
            BlackBoxError::Configuration {
                reason: format!("invalid private key PEM: {}", e),
            }
        })?;
        Ok(Self { inner })
    }

    /// Read and parse a PKCS#8 PEM private key file.
    pub fn from_file(path: &Path) -> BlackBoxResult<Self> {
        Self::from_pem(&read_key_file(path)?)
    }

    /// Derive the key from a 32-byte secret seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            inner: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Export as PKCS#8 PEM.
    pub fn to_pem(&self) -> BlackBoxResult<String> {
        let pem = self
            .inner
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| BlackBoxError::Configuration {
                reason: format!("cannot encode private key: {}", e),
            })?;
        Ok(pem.to_string())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.inner
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public_key().fingerprint())
            .finish_non_exhaustive()
    }
}

/// The key the recorder trusts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Parse a SubjectPublicKeyInfo PEM public key.
    pub fn from_pem(pem: &str) -> BlackBoxResult<Self> {
        let inner = VerifyingKey::from_public_key_pem(pem.trim()).map_err(|e| {
            BlackBoxError::Configuration {
                reason: format!("invalid public key PEM: {}", e),
            }
        })?;
        Ok(Self { inner })
    }

    /// Read and parse a SubjectPublicKeyInfo PEM public key file.
    pub fn from_file(path: &Path) -> BlackBoxResult<Self> {
        Self::from_pem(&read_key_file(path)?)
    }

    /// Export as SubjectPublicKeyInfo PEM.
    pub fn to_pem(&self) -> BlackBoxResult<String> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| BlackBoxError::Configuration {
                reason: format!("cannot encode public key: {}", e),
            })
    }

    /// Short SHA-256 fingerprint of the raw key, lowercase hex.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.inner.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_LEN);
        hex
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.inner
    }
}

fn read_key_file(path: &Path) -> BlackBoxResult<String> {
    std::fs::read_to_string(path).map_err(|e| BlackBoxError::Configuration {
        reason: format!("failed to read key file '{}': {}", path.display(), e),
    })
}
