use thiserror::Error;

use crate::protocol::crypto::CryptoError;
use crate::protocol::rtsp::StatusCode;
use crate::protocol::sdp::AnnounceError;
use crate::receiver::rtp_receiver::RtpReceiveError;

/// Why a control request was refused
///
/// Every variant but `Timeout` resolves to an RTSP status on the connection
/// that caused it. None of them reach the application except through
/// [`ReceiverEvent`](crate::ReceiverEvent).
#[derive(Debug, Error)]
pub enum RaopError {
    /// Malformed or unknown request
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Missing or wrong digest credentials
    #[error("authentication required")]
    Auth,

    /// Another client is already connected
    #[error("receiver busy")]
    Capacity,

    /// The announced codec cannot be decoded
    #[error("unsupported media: {0}")]
    UnsupportedMedia(String),

    /// Key unwrap or signing failed
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    /// Request not valid for this connection or session state
    #[error("method not valid in this state: {0}")]
    InvalidState(String),

    /// UDP sockets could not be set up
    #[error("transport setup failed: {0}")]
    Transport(#[from] RtpReceiveError),

    /// Control heartbeat stopped
    #[error("control channel timed out")]
    Timeout,
}

impl RaopError {
    /// RTSP status sent back for this error, if any
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Protocol(_) | Self::Crypto(_) => Some(StatusCode::BAD_REQUEST),
            Self::Auth => Some(StatusCode::UNAUTHORIZED),
            Self::Capacity => Some(StatusCode::NOT_ENOUGH_BANDWIDTH),
            Self::UnsupportedMedia(_) => Some(StatusCode::UNSUPPORTED_MEDIA_TYPE),
            Self::InvalidState(_) => Some(StatusCode::METHOD_NOT_VALID_IN_STATE),
            Self::Transport(_) => Some(StatusCode::INTERNAL_ERROR),
            Self::Timeout => None,
        }
    }

    /// The control connection is closed after the response
    #[must_use]
    pub fn closes_connection(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

impl From<AnnounceError> for RaopError {
    fn from(err: AnnounceError) -> Self {
        match err {
            AnnounceError::Crypto(e) => Self::Crypto(e),
            other => Self::UnsupportedMedia(other.to_string()),
        }
    }
}
