use super::{CryptoError, lengths};
use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};
use zeroize::Zeroize;

/// AES-128-CBC decryptor for RAOP audio payloads
///
/// Every packet restarts the CBC chain from the session IV; blocks are only
/// chained within one payload. Senders encrypt whole 16-byte blocks only and
/// leave any trailing remainder in clear, so the remainder is copied through
/// untouched.
pub struct AudioCipher {
    cipher: Aes128,
    iv: [u8; 16],
}

impl AudioCipher {
    /// Create a cipher from the session key and IV
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if key or IV is not 16 bytes.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != lengths::AES_128_KEY {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::AES_128_KEY,
                actual: key.len(),
            });
        }
        let iv: [u8; 16] = iv.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: lengths::AES_BLOCK,
            actual: iv.len(),
        })?;

        Ok(Self {
            cipher: Aes128::new(GenericArray::from_slice(key)),
            iv,
        })
    }

    /// Decrypt a payload in place
    pub fn decrypt_in_place(&self, data: &mut [u8]) {
        let whole = data.len() - data.len() % lengths::AES_BLOCK;
        let mut prev = self.iv;

        for chunk in data[..whole].chunks_exact_mut(lengths::AES_BLOCK) {
            let mut ciphertext = [0u8; 16];
            ciphertext.copy_from_slice(chunk);

            let block = GenericArray::from_mut_slice(chunk);
            self.cipher.decrypt_block(block);
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= *p;
            }

            prev = ciphertext;
        }
    }

    /// Decrypt a payload into a new buffer
    #[must_use]
    pub fn decrypt(&self, encrypted: &[u8]) -> Vec<u8> {
        let mut out = encrypted.to_vec();
        self.decrypt_in_place(&mut out);
        out
    }
}

impl Drop for AudioCipher {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl std::fmt::Debug for AudioCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCipher").finish_non_exhaustive()
    }
}
