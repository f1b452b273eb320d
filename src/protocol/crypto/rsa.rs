//! Server RSA key for RAOP receivers

use std::path::Path;

use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use super::CryptoError;

/// RSA key sizes used in RAOP
pub mod sizes {
    /// Modulus size of the AirPort Express key (2048 bits)
    pub const AIRPORT_MODULUS_BITS: usize = 2048;
    /// Modulus size used for generated keys
    pub const GENERATED_MODULUS_BITS: usize = 1024;
}

/// The receiver's long-lived RSA private key
///
/// Loaded once at startup and shared read-only (`Arc<ServerKey>`) with every
/// connection. It answers the `Apple-Challenge` handshake and unwraps the
/// per-session AES key sent in the `ANNOUNCE` body.
pub struct ServerKey {
    inner: RsaPrivateKey,
}

impl ServerKey {
    /// Generate a fresh 1024-bit key
    ///
    /// Senders that verify `Apple-Response` against Apple's public key will
    /// reject a generated key; it is fine for senders that do not.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RngError` if key generation fails.
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with_bits(sizes::GENERATED_MODULUS_BITS)
    }

    /// Generate a fresh key with the given modulus size
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RngError` if key generation fails.
    pub fn generate_with_bits(bits: usize) -> Result<Self, CryptoError> {
        let inner = RsaPrivateKey::new(&mut OsRng, bits).map_err(|_| CryptoError::RngError)?;
        Ok(Self { inner })
    }

    /// Load from a PEM string, PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`)
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidPrivateKey` if neither encoding parses.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let inner = if pem.contains("BEGIN RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?
        } else {
            RsaPrivateKey::from_pkcs8_pem(pem)
                .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?
        };

        Ok(Self { inner })
    }

    /// Load from a PEM file
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if the file cannot be read or parsed.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(&pem)
    }

    /// Decrypt RSA-OAEP (SHA-1) data
    ///
    /// Used to unwrap the `rsaaeskey` attribute.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` on malformed ciphertext.
    pub fn decrypt_oaep(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner
            .decrypt(Oaep::new::<Sha1>(), ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }

    /// Raw private-key encryption with PKCS#1 v1.5 type-1 padding
    ///
    /// This is a signature over `message` with no digest prefix, which is what
    /// the `Apple-Response` header carries.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if the message is too long for
    /// the modulus.
    pub fn private_encrypt(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner
            .sign(Pkcs1v15Sign::new_unprefixed(), message)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }

    /// Get the corresponding public key
    #[must_use]
    pub fn public_key(&self) -> RsaPublicKey {
        self.inner.to_public_key()
    }

    /// Modulus size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size()
    }
}

impl std::fmt::Debug for ServerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKey")
            .field("bits", &(self.size() * 8))
            .finish_non_exhaustive()
    }
}
