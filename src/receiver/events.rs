//! Receiver events for application integration

use bytes::Bytes;

use super::audio_pipeline::AudioStream;
use super::session::Metadata;

/// Events emitted by the receiver
///
/// Delivered in order on the channel returned by
/// [`AirTunesReceiver::take_events`](super::AirTunesReceiver::take_events).
#[derive(Debug)]
pub enum ReceiverEvent {
    /// Receiver is listening
    Started {
        /// Receiver name
        name: String,
        /// Listen port
        port: u16,
    },

    /// Receiver stopped
    Stopped,

    /// A client announced successfully; its decoded audio arrives on the stream
    ClientConnected(AudioStream),

    /// The connected client went away (teardown, socket close or timeout)
    ClientDisconnected,

    /// Sender display name from the announce body
    ClientNameChanged(String),

    /// Full metadata snapshot after a DMAP update
    MetadataChanged(Metadata),

    /// Raw artwork bytes
    ArtworkChanged(Bytes),

    /// Volume in dB, `-144.0` for mute
    VolumeChanged(f32),

    /// `progress` parameter, verbatim
    ProgressChanged(String),

    /// A request was refused in a way the application should know about
    Error {
        /// RTSP status sent back
        code: u16,
        /// Human readable reason
        message: String,
    },
}

impl ReceiverEvent {
    /// Short name for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Stopped => "stopped",
            Self::ClientConnected(_) => "client_connected",
            Self::ClientDisconnected => "client_disconnected",
            Self::ClientNameChanged(_) => "client_name_changed",
            Self::MetadataChanged(_) => "metadata_changed",
            Self::ArtworkChanged(_) => "artwork_changed",
            Self::VolumeChanged(_) => "volume_changed",
            Self::ProgressChanged(_) => "progress_changed",
            Self::Error { .. } => "error",
        }
    }
}
