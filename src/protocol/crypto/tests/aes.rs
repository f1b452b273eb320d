use super::super::*;

fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

// NIST SP 800-38A, F.2.1 CBC-AES128
const KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";
const IV: &str = "000102030405060708090a0b0c0d0e0f";
const PLAINTEXT: &str = "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51";
const CIPHERTEXT: &str = "7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2";

#[test]
fn test_cbc_known_vector() {
    let cipher = AudioCipher::new(&hex(KEY), &hex(IV)).unwrap();
    assert_eq!(cipher.decrypt(&hex(CIPHERTEXT)), hex(PLAINTEXT));
}

#[test]
fn test_trailing_partial_block_passes_through() {
    let cipher = AudioCipher::new(&hex(KEY), &hex(IV)).unwrap();

    let mut payload = hex(CIPHERTEXT);
    payload.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

    let decrypted = cipher.decrypt(&payload);
    assert_eq!(decrypted.len(), 35);
    assert_eq!(&decrypted[..32], hex(PLAINTEXT).as_slice());
    assert_eq!(&decrypted[32..], &[0xAA, 0xBB, 0xCC]);
}

#[test]
fn test_iv_resets_per_payload() {
    let cipher = AudioCipher::new(&hex(KEY), &hex(IV)).unwrap();

    let first = cipher.decrypt(&hex(CIPHERTEXT));
    let second = cipher.decrypt(&hex(CIPHERTEXT));
    assert_eq!(first, second);
}

#[test]
fn test_short_payload_untouched() {
    let cipher = AudioCipher::new(&hex(KEY), &hex(IV)).unwrap();
    assert_eq!(cipher.decrypt(&[1, 2, 3]), vec![1, 2, 3]);
    assert!(cipher.decrypt(&[]).is_empty());
}

#[test]
fn test_rejects_bad_lengths() {
    assert!(matches!(
        AudioCipher::new(&[0u8; 15], &[0u8; 16]),
        Err(CryptoError::InvalidKeyLength {
            expected: 16,
            actual: 15
        })
    ));
    assert!(AudioCipher::new(&[0u8; 16], &[0u8; 8]).is_err());
}

#[test]
fn test_base64_padding_indifferent() {
    let padded = decode_base64("AQIDBA==").unwrap();
    let unpadded = decode_base64("AQIDBA").unwrap();
    assert_eq!(padded, vec![1, 2, 3, 4]);
    assert_eq!(padded, unpadded);
    assert_eq!(encode_base64(&[1, 2, 3, 4]), "AQIDBA");
    assert!(decode_base64("not base64!").is_err());
}
