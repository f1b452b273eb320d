//! Built-in Apple Lossless decoder backed by symphonia

use bytes::Bytes;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_ALAC, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::formats::Packet;

use super::decoder::{AudioDecoder, DecodeError};
use crate::protocol::sdp::DecoderConfig;

/// Size of the ALAC magic cookie built from the fmtp fields
pub const MAGIC_COOKIE_SIZE: usize = 24;

/// Serialize the fmtp fields as an `ALACSpecificConfig` magic cookie
#[must_use]
pub fn magic_cookie(config: &DecoderConfig) -> [u8; MAGIC_COOKIE_SIZE] {
    let mut cookie = [0u8; MAGIC_COOKIE_SIZE];
    cookie[0..4].copy_from_slice(&config.frame_length.to_be_bytes());
    cookie[4] = config.compatible_version;
    cookie[5] = config.bit_depth;
    cookie[6] = config.pb;
    cookie[7] = config.mb;
    cookie[8] = config.kb;
    cookie[9] = config.channels;
    cookie[10..12].copy_from_slice(&config.max_run.to_be_bytes());
    cookie[12..16].copy_from_slice(&config.max_frame_bytes.to_be_bytes());
    cookie[16..20].copy_from_slice(&config.avg_bit_rate.to_be_bytes());
    cookie[20..24].copy_from_slice(&config.sample_rate.to_be_bytes());
    cookie
}

/// ALAC decoder producing interleaved i16 little-endian PCM
pub struct AlacDecoder {
    decoder: Box<dyn Decoder>,
}

impl AlacDecoder {
    /// Create a decoder for the announced stream
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::InvalidConfig` if symphonia rejects the cookie.
    pub fn new(config: &DecoderConfig) -> Result<Self, DecodeError> {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_ALAC)
            .with_sample_rate(config.sample_rate)
            .with_extra_data(magic_cookie(config).to_vec().into_boxed_slice());

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::InvalidConfig(e.to_string()))?;

        Ok(Self { decoder })
    }
}

impl AudioDecoder for AlacDecoder {
    fn decode(&mut self, frame: &[u8]) -> Result<Bytes, DecodeError> {
        let packet = Packet::new_from_slice(0, 0, 0, frame);
        let decoded = self
            .decoder
            .decode(&packet)
            .map_err(|e| DecodeError::Frame(e.to_string()))?;

        let spec = *decoded.spec();
        let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);

        let mut out = Vec::with_capacity(samples.len() * 2);
        for sample in samples.samples() {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(Bytes::from(out))
    }
}
