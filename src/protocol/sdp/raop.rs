//! RAOP-specific SDP parsing
//!
//! Extracts codec, decoder and encryption parameters from an `ANNOUNCE` body.

use std::str::FromStr;

use thiserror::Error;
use zeroize::Zeroizing;

use super::{SdpParseError, SessionDescription};
use crate::protocol::crypto::{CryptoError, ServerKey, decode_base64, lengths};

/// Audio codecs a RAOP receiver negotiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    /// 16-bit big-endian linear PCM (`L16`)
    Pcm,
    /// Apple Lossless (`AppleLossless`)
    Alac,
}

impl AudioCodec {
    /// Pick the codec named by an `rtpmap` value
    #[must_use]
    pub fn from_rtpmap(rtpmap: &str) -> Option<Self> {
        if rtpmap.contains("AppleLossless") {
            Some(AudioCodec::Alac)
        } else if rtpmap.contains("L16") {
            Some(AudioCodec::Pcm)
        } else {
            None
        }
    }
}

/// The eleven positional `fmtp` fields
///
/// These are the ALAC "magic cookie" parameters; PCM streams carry the same
/// line and the byte-swap decoder ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Samples per packet
    pub frame_length: u32,
    /// Compatible version
    pub compatible_version: u8,
    /// Bits per sample
    pub bit_depth: u8,
    /// Rice history mult
    pub pb: u8,
    /// Rice initial history
    pub mb: u8,
    /// Rice limit
    pub kb: u8,
    /// Number of channels
    pub channels: u8,
    /// Max run
    pub max_run: u16,
    /// Max frame bytes
    pub max_frame_bytes: u32,
    /// Average bit rate
    pub avg_bit_rate: u32,
    /// Sample rate
    pub sample_rate: u32,
}

impl Default for DecoderConfig {
    /// iTunes' stock values: `352 0 16 40 10 14 2 255 0 0 44100`
    fn default() -> Self {
        Self {
            frame_length: 352,
            compatible_version: 0,
            bit_depth: 16,
            pb: 40,
            mb: 10,
            kb: 14,
            channels: 2,
            max_run: 255,
            max_frame_bytes: 0,
            avg_bit_rate: 0,
            sample_rate: 44100,
        }
    }
}

fn fmtp_field<T: FromStr>(parts: &[&str], index: usize, name: &str) -> Result<T, SdpParseError> {
    parts[index]
        .parse()
        .map_err(|_| SdpParseError::InvalidAttribute(format!("fmtp {name}: {}", parts[index])))
}

impl DecoderConfig {
    /// Parse an `fmtp` attribute value
    ///
    /// Accepts `96 352 0 16 40 10 14 2 255 0 0 44100` (payload type first) or
    /// the same without the payload type.
    ///
    /// # Errors
    /// Returns `SdpParseError::InvalidAttribute` on a wrong field count or a
    /// non-numeric field.
    pub fn from_fmtp(fmtp: &str) -> Result<Self, SdpParseError> {
        let parts: Vec<&str> = fmtp.split_whitespace().collect();
        let offset = match parts.len() {
            12 => 1,
            11 => 0,
            n => {
                return Err(SdpParseError::InvalidAttribute(format!(
                    "fmtp needs 11 fields, got {n}: {fmtp}"
                )));
            }
        };
        let p = &parts[offset..];

        Ok(Self {
            frame_length: fmtp_field(p, 0, "frame length")?,
            compatible_version: fmtp_field(p, 1, "compatible version")?,
            bit_depth: fmtp_field(p, 2, "bit depth")?,
            pb: fmtp_field(p, 3, "pb")?,
            mb: fmtp_field(p, 4, "mb")?,
            kb: fmtp_field(p, 5, "kb")?,
            channels: fmtp_field(p, 6, "channels")?,
            max_run: fmtp_field(p, 7, "max run")?,
            max_frame_bytes: fmtp_field(p, 8, "max frame bytes")?,
            avg_bit_rate: fmtp_field(p, 9, "average bit rate")?,
            sample_rate: fmtp_field(p, 10, "sample rate")?,
        })
    }
}

/// Why an `ANNOUNCE` body was rejected
#[derive(Debug, Error)]
pub enum AnnounceError {
    /// `rtpmap` names neither `L16` nor `AppleLossless`
    #[error("Codec not supported ({0})")]
    UnsupportedCodec(String),

    /// No `rtpmap` attribute at all
    #[error("Codec not supported (no rtpmap)")]
    MissingCodec,

    /// Malformed attribute
    #[error(transparent)]
    Sdp(#[from] SdpParseError),

    /// Key unwrap or base64 failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Everything a session needs from the `ANNOUNCE` body
#[derive(Debug, Clone)]
pub struct AnnounceParameters {
    /// Codec selected from `rtpmap`
    pub codec: AudioCodec,
    /// Raw `rtpmap` value, e.g. `96 L16/44100/2`
    pub rtpmap: String,
    /// Decoder configuration from `fmtp`, or the stock values
    pub decoder_config: DecoderConfig,
    /// AES key unwrapped from `rsaaeskey`
    pub aes_key: Option<Zeroizing<Vec<u8>>>,
    /// AES IV from `aesiv`
    pub aes_iv: Option<Vec<u8>>,
    /// Sender display name (`i=`)
    pub client_name: Option<String>,
    /// Sender asked for IPv6 (`c=IN IP6 ...`)
    pub ipv6: bool,
}

impl AnnounceParameters {
    /// Extract announce parameters, unwrapping the session key with `server_key`
    ///
    /// # Errors
    /// Returns `AnnounceError` for an unsupported or missing codec, a
    /// malformed `fmtp`, or a key/IV that fails to decode.
    pub fn from_sdp(sdp: &SessionDescription, server_key: &ServerKey) -> Result<Self, AnnounceError> {
        let rtpmap = sdp.attribute("rtpmap").ok_or(AnnounceError::MissingCodec)?;
        let codec = AudioCodec::from_rtpmap(rtpmap)
            .ok_or_else(|| AnnounceError::UnsupportedCodec(rtpmap.to_string()))?;

        let decoder_config = sdp
            .attribute("fmtp")
            .map(DecoderConfig::from_fmtp)
            .transpose()?
            .unwrap_or_default();

        let aes_key = sdp
            .attribute("rsaaeskey")
            .map(|encoded| -> Result<_, CryptoError> {
                let wrapped = decode_base64(encoded)?;
                let key = Zeroizing::new(server_key.decrypt_oaep(&wrapped)?);
                if key.len() != lengths::AES_128_KEY {
                    return Err(CryptoError::InvalidKeyLength {
                        expected: lengths::AES_128_KEY,
                        actual: key.len(),
                    });
                }
                Ok(key)
            })
            .transpose()?;

        let aes_iv = sdp.attribute("aesiv").map(decode_base64).transpose()?;
        if let Some(iv) = &aes_iv {
            if iv.len() != lengths::AES_BLOCK {
                return Err(CryptoError::InvalidKeyLength {
                    expected: lengths::AES_BLOCK,
                    actual: iv.len(),
                }
                .into());
            }
        }
        if aes_key.is_some() && aes_iv.is_none() {
            return Err(SdpParseError::MissingField("aesiv").into());
        }

        Ok(Self {
            codec,
            rtpmap: rtpmap.to_string(),
            decoder_config,
            aes_key,
            aes_iv,
            client_name: sdp.client_name().map(str::to_string),
            ipv6: sdp.is_ipv6(),
        })
    }

    /// True if the stream is AES encrypted
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.aes_key.is_some()
    }
}
