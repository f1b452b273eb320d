//! RTP packet framing for RAOP audio

mod packet;


pub use packet::{RtpDecodeError, RtpHeader, RtpPacket};
