//! Receiver session state
//!
//! One [`Session`] exists per receiver. It carries what the current client
//! negotiated (codec, key material, ports) plus the latest metadata snapshot,
//! and is reset to `Idle` on teardown.

use bytes::Bytes;
use zeroize::Zeroize;

use crate::protocol::daap::{DmapMap, DmapValue};
use crate::protocol::sdp::AnnounceParameters;

/// Session states following the RAOP request flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No client has announced
    #[default]
    Idle,
    /// `ANNOUNCE` accepted, waiting for `SETUP`
    AwaitingSetup,
    /// UDP ports bound
    Ready,
    /// `RECORD` received
    Streaming,
}

impl SessionState {
    /// Check if transition to new state is valid
    #[must_use]
    pub fn can_transition_to(&self, new_state: SessionState) -> bool {
        use SessionState::{AwaitingSetup, Idle, Ready, Streaming};

        match (self, new_state) {
            (Idle, AwaitingSetup)
            | (AwaitingSetup | Ready | Streaming, Ready)
            | (Ready | Streaming, Streaming)
            | (_, Idle) => true,

            _ => false,
        }
    }

    /// Ports are bound and audio may arrive
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Streaming)
    }
}

/// Initial sequence/timestamp pair from `RTP-Info`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpInfo {
    /// First RTP sequence number
    pub seq: u16,
    /// First RTP timestamp
    pub rtptime: u32,
}

impl RtpInfo {
    /// Parse `seq=<n>;rtptime=<n>`
    ///
    /// Fields may appear in either order; both are required.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let mut seq = None;
        let mut rtptime = None;

        for field in value.split(';') {
            let Some((key, val)) = field.trim().split_once('=') else {
                continue;
            };
            match key.trim() {
                "seq" => seq = val.trim().parse().ok(),
                "rtptime" => rtptime = val.trim().parse().ok(),
                _ => {}
            }
        }

        Some(Self {
            seq: seq?,
            rtptime: rtptime?,
        })
    }
}

/// Metadata snapshot handed to the application
///
/// A DMAP update replaces `tags` wholesale; the other fields follow their own
/// `SET_PARAMETER` content types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Sender display name (`i=` in the announce body)
    pub client_name: Option<String>,
    /// Last volume received, in dB (`-144.0` is mute)
    pub volume: Option<f32>,
    /// Last `progress` value, verbatim (`start/current/end`)
    pub progress: Option<String>,
    /// Last artwork image
    pub artwork: Option<Bytes>,
    /// Decoded DMAP tags
    pub tags: DmapMap,
}

impl Metadata {
    fn tag_str(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).and_then(DmapValue::as_str)
    }

    /// Track title (`minm`)
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.tag_str("minm")
    }

    /// Artist (`asar`)
    #[must_use]
    pub fn artist(&self) -> Option<&str> {
        self.tag_str("asar")
    }

    /// Album (`asal`)
    #[must_use]
    pub fn album(&self) -> Option<&str> {
        self.tag_str("asal")
    }

    /// Genre (`asgn`)
    #[must_use]
    pub fn genre(&self) -> Option<&str> {
        self.tag_str("asgn")
    }

    /// Track length in milliseconds (`astm`)
    #[must_use]
    pub fn duration_ms(&self) -> Option<u32> {
        self.tags
            .get("astm")
            .and_then(DmapValue::as_u64)
            .and_then(|ms| u32::try_from(ms).ok())
    }
}

/// Negotiated state of the current client
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    /// Parameters from the accepted `ANNOUNCE`
    pub announce: Option<AnnounceParameters>,
    /// `Session` header value handed out at `SETUP`
    pub session_id: Option<String>,
    /// Stream start from `RECORD`
    pub rtp_info: Option<RtpInfo>,
    /// Latest metadata
    pub metadata: Metadata,
    /// Outstanding digest nonce
    pub nonce: Option<String>,
}

impl Session {
    /// Fresh idle session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `new_state`, returning false if the move is not allowed
    pub fn transition(&mut self, new_state: SessionState) -> bool {
        if !self.state.can_transition_to(new_state) {
            tracing::debug!("Rejected session transition {:?} -> {:?}", self.state, new_state);
            return false;
        }
        tracing::trace!("Session {:?} -> {:?}", self.state, new_state);
        self.state = new_state;
        true
    }

    /// Wipe key material and metadata and go back to `Idle`
    pub fn reset(&mut self) {
        if let Some(mut announce) = self.announce.take() {
            if let Some(iv) = announce.aes_iv.as_mut() {
                iv.zeroize();
            }
            // the key itself is `Zeroizing` and wipes on drop
        }
        self.session_id = None;
        self.rtp_info = None;
        self.metadata = Metadata::default();
        self.nonce = None;
        self.state = SessionState::Idle;
    }
}
