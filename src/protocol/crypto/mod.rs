//! Cryptographic primitives for RAOP
//!
//! The receiver needs three of them: the server RSA key (OAEP decryption of
//! the session key and the Apple-Challenge signature), AES-128-CBC for the
//! audio payloads, and base64 helpers for the header encodings. MD5 digest
//! authentication lives in [`crate::protocol::raop::digest`].

mod aes;
mod error;
mod rsa;
#[cfg(test)]
mod tests;

pub use self::aes::AudioCipher;
pub use self::error::CryptoError;
pub use self::rsa::{ServerKey, sizes as rsa_sizes};

use base64::Engine as _;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// Length of various cryptographic values
pub mod lengths {
    /// AES-128 key length
    pub const AES_128_KEY: usize = 16;
    /// AES block (and CBC IV) length
    pub const AES_BLOCK: usize = 16;
}

/// Base64 engine that accepts input with or without trailing `=` padding.
///
/// Senders are inconsistent about padding `Apple-Challenge`, `rsaaeskey` and
/// `aesiv` values.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a base64 header or attribute value, padded or not.
///
/// # Errors
///
/// Returns `CryptoError::InvalidBase64` if the input is not valid base64.
pub fn decode_base64(value: &str) -> Result<Vec<u8>, CryptoError> {
    LENIENT_BASE64
        .decode(value.trim())
        .map_err(|e| CryptoError::InvalidBase64(e.to_string()))
}

/// Encode bytes as unpadded base64, the form used in `Apple-Response`.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    LENIENT_BASE64.encode(data)
}
