use thiserror::Error;

/// Cryptographic operation errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("failed to read key file: {0}")]
    KeyFile(#[from] std::io::Error),

    #[error("RNG error")]
    RngError,
}
