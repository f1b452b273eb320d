//! RAOP receiver
//!
//! Server side of an AirTunes session: the RTSP listener and session
//! controller, the RTP receiver, and the reorder/decode pipeline that turns
//! received packets into PCM for the application.

#[cfg(feature = "decoders")]
pub mod alac_decoder;
pub mod announce_handler;
pub mod audio_pipeline;
pub mod config;
pub mod decoder;
pub mod events;
pub mod reorder_buffer;
pub mod rtp_receiver;
pub mod rtsp_handler;
pub mod server;
pub mod session;
pub mod session_manager;
pub mod set_parameter_handler;

#[cfg(test)]
mod tests;

pub use audio_pipeline::{AudioStream, DecodePipeline, PipelineHandle};
pub use config::{ConfigError, MacAddress, ReceiverConfig};
pub use decoder::{AudioDecoder, DecodeError, DecoderFactory, DecoderRegistry, PcmDecoder};
pub use events::ReceiverEvent;
pub use reorder_buffer::{FlowMode, PacketSink, ReorderBuffer};
pub use rtp_receiver::{RtpPorts, RtpReceiveError, RtpReceiver, RtpSockets};
pub use server::{AirTunesReceiver, ReceiverError};
pub use session::{Metadata, RtpInfo, Session, SessionState};
pub use session_manager::{ConnectionContext, HandleOutcome, SessionController};
