//! Codec decoders for the receive pipeline
//!
//! The pipeline only knows the [`AudioDecoder`] trait. Linear PCM is handled
//! here; Apple Lossless comes from a factory registered in a
//! [`DecoderRegistry`], either the built-in one (`decoders` feature) or one
//! supplied by the application.

use std::sync::Arc;

use bytes::Bytes;

use crate::protocol::sdp::{AudioCodec, DecoderConfig};

/// Decoder errors
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// No decoder registered for the codec
    #[error("no decoder available for {0:?}")]
    Unavailable(AudioCodec),

    /// The decoder rejected its configuration
    #[error("invalid decoder configuration: {0}")]
    InvalidConfig(String),

    /// A frame failed to decode
    #[error("decode failed: {0}")]
    Frame(String),
}

/// Turns one RTP payload into interleaved 16-bit little-endian PCM
pub trait AudioDecoder: Send {
    /// Decode a single frame
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Frame` if the frame is corrupt.
    fn decode(&mut self, frame: &[u8]) -> Result<Bytes, DecodeError>;
}

/// `L16` decoder: swaps the two bytes of every sample
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmDecoder;

impl AudioDecoder for PcmDecoder {
    fn decode(&mut self, frame: &[u8]) -> Result<Bytes, DecodeError> {
        let mut out = frame.to_vec();
        for sample in out.chunks_exact_mut(2) {
            sample.swap(0, 1);
        }
        Ok(Bytes::from(out))
    }
}

/// Builds a decoder from the announced `fmtp` parameters
pub type DecoderFactory =
    Arc<dyn Fn(&DecoderConfig) -> Result<Box<dyn AudioDecoder>, DecodeError> + Send + Sync>;

/// Which codecs the receiver can decode, and how
#[derive(Clone)]
pub struct DecoderRegistry {
    alac: Option<DecoderFactory>,
}

impl DecoderRegistry {
    /// PCM plus the built-in ALAC decoder when the `decoders` feature is on
    #[must_use]
    pub fn new() -> Self {
        Self {
            alac: builtin_alac(),
        }
    }

    /// PCM only; `ANNOUNCE` for Apple Lossless is answered 415
    #[must_use]
    pub fn pcm_only() -> Self {
        Self { alac: None }
    }

    /// Use an application-supplied ALAC decoder
    #[must_use]
    pub fn with_alac<F>(mut self, factory: F) -> Self
    where
        F: Fn(&DecoderConfig) -> Result<Box<dyn AudioDecoder>, DecodeError> + Send + Sync + 'static,
    {
        self.alac = Some(Arc::new(factory));
        self
    }

    /// Whether `codec` can be decoded
    #[must_use]
    pub fn supports(&self, codec: AudioCodec) -> bool {
        match codec {
            AudioCodec::Pcm => true,
            AudioCodec::Alac => self.alac.is_some(),
        }
    }

    /// Create a decoder for a session
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Unavailable` if nothing is registered for the
    /// codec, or the factory's error.
    pub fn create(
        &self,
        codec: AudioCodec,
        config: &DecoderConfig,
    ) -> Result<Box<dyn AudioDecoder>, DecodeError> {
        match codec {
            AudioCodec::Pcm => Ok(Box::new(PcmDecoder)),
            AudioCodec::Alac => {
                let factory = self.alac.as_ref().ok_or(DecodeError::Unavailable(codec))?;
                factory(config)
            }
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("alac", &self.alac.is_some())
            .finish()
    }
}

#[cfg(feature = "decoders")]
fn builtin_alac() -> Option<DecoderFactory> {
    Some(Arc::new(|config: &DecoderConfig| {
        super::alac_decoder::AlacDecoder::new(config)
            .map(|decoder| Box::new(decoder) as Box<dyn AudioDecoder>)
    }))
}

#[cfg(not(feature = "decoders"))]
fn builtin_alac() -> Option<DecoderFactory> {
    None
}
