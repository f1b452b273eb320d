//! RAOP challenge-response authentication (server side)

use std::net::IpAddr;

use super::super::crypto::{CryptoError, ServerKey, decode_base64, encode_base64};

/// Minimum size of the signed message
pub const RESPONSE_MESSAGE_SIZE: usize = 32;

/// Build the message to sign for Apple-Response
///
/// `challenge || ip_address || mac_address`, zero-padded to 32 bytes. An
/// IPv4-mapped IPv6 address contributes its 4-byte IPv4 form.
#[must_use]
pub fn build_response_message(challenge: &[u8], ip_address: &IpAddr, mac_address: &[u8; 6]) -> Vec<u8> {
    let mut message = Vec::with_capacity(RESPONSE_MESSAGE_SIZE.max(challenge.len() + 22));

    message.extend_from_slice(challenge);

    match normalize_ip(ip_address) {
        IpAddr::V4(addr) => message.extend_from_slice(&addr.octets()),
        IpAddr::V6(addr) => message.extend_from_slice(&addr.octets()),
    }

    message.extend_from_slice(mac_address);

    if message.len() < RESPONSE_MESSAGE_SIZE {
        message.resize(RESPONSE_MESSAGE_SIZE, 0);
    }

    message
}

/// Collapse `::ffff:a.b.c.d` to `a.b.c.d`
#[must_use]
pub fn normalize_ip(ip_address: &IpAddr) -> IpAddr {
    match ip_address {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(*ip_address, IpAddr::V4),
        IpAddr::V4(_) => *ip_address,
    }
}

/// Answer an `Apple-Challenge` header
///
/// Returns the unpadded base64 value for the `Apple-Response` header.
///
/// # Errors
///
/// Returns `CryptoError` if the challenge is not base64 or signing fails.
pub fn generate_response(
    server_key: &ServerKey,
    challenge_header: &str,
    ip_address: &IpAddr,
    mac_address: &[u8; 6],
) -> Result<String, CryptoError> {
    let challenge = decode_base64(challenge_header)?;
    let message = build_response_message(&challenge, ip_address, mac_address);
    let signature = server_key.private_encrypt(&message)?;
    Ok(encode_base64(&signature))
}
