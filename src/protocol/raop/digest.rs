//! Password digest authentication for `ANNOUNCE`
//!
//! RAOP uses a cut-down RFC 2617 digest: fixed username and realm, MD5 only,
//! no qop. The expected response is
//! `MD5(MD5(user:realm:password):nonce:MD5(method:uri))` in lowercase hex.

use std::collections::HashMap;

use md5::{Digest, Md5};
use rand::RngCore;

/// Username every RAOP sender authenticates as
pub const DIGEST_USERNAME: &str = "iTunes";
/// Digest realm
pub const DIGEST_REALM: &str = "roap";
/// The only method that is challenged
pub const DIGEST_METHOD: &str = "ANNOUNCE";

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Compute the expected digest response
#[must_use]
pub fn digest_response(
    username: &str,
    realm: &str,
    password: &str,
    nonce: &str,
    uri: &str,
    method: &str,
) -> String {
    let ha1 = md5_hex(&format!("{username}:{realm}:{password}"));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    md5_hex(&format!("{ha1}:{nonce}:{ha2}"))
}

/// Generate a fresh 32-hex-digit nonce
#[must_use]
pub fn generate_nonce() -> String {
    let mut seed = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut seed);
    format!("{:x}", Md5::digest(seed))
}

/// `WWW-Authenticate` value for a nonce
#[must_use]
pub fn challenge_header(nonce: &str) -> String {
    format!("Digest realm=\"{DIGEST_REALM}\", nonce=\"{nonce}\"")
}

/// Parse an `Authorization` header into its `key="value"` pairs
///
/// A leading `Digest` scheme token is dropped; quotes around values are
/// removed. Pairs without `=` are skipped.
#[must_use]
pub fn parse_authorization(header: &str) -> HashMap<String, String> {
    let header = header.trim();
    let params = header
        .strip_prefix("Digest ")
        .or_else(|| header.strip_prefix("digest "))
        .unwrap_or(header);

    params
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ))
        })
        .collect()
}

/// Check an `Authorization` header against the configured password
///
/// The username and method are protocol constants; only `uri` and `response`
/// are taken from the header.
#[must_use]
pub fn verify_authorization(header: &str, password: &str, nonce: &str) -> bool {
    let params = parse_authorization(header);
    let (Some(uri), Some(response)) = (params.get("uri"), params.get("response")) else {
        return false;
    };

    let expected = digest_response(
        DIGEST_USERNAME,
        DIGEST_REALM,
        password,
        nonce,
        uri,
        DIGEST_METHOD,
    );
    *response == expected
}
