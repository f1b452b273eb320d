//! # airtunes
//!
//! Server side of AirPlay audio (RAOP): accepts a sender's RTSP session,
//! receives its encrypted RTP audio, and hands the application ordered,
//! decoded PCM plus metadata notifications.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use airtunes::{AirTunesReceiver, ReceiverConfig, ReceiverEvent, ServerKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let key = Arc::new(ServerKey::from_pem_file("airport.pem")?);
//! let mut receiver = AirTunesReceiver::new(ReceiverConfig::with_name("Kitchen"), key);
//! let mut events = receiver.take_events().expect("first call");
//!
//! receiver.start().await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let ReceiverEvent::ClientConnected(mut audio) = event {
//!         tokio::spawn(async move {
//!             while let Some(pcm) = audio.recv().await {
//!                 // 16-bit little-endian stereo at 44.1 kHz
//!                 let _ = pcm;
//!             }
//!         });
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **`protocol`**: sans-IO pieces: RTSP framing, SDP, DMAP, RTP headers,
//!   the Apple challenge, digest auth and the session crypto
//! - **`receiver`**: the tokio side: listener, session controller, RTP
//!   sockets and the reorder/decode pipeline

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Error types
pub mod error;

pub mod protocol;
pub mod receiver;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use error::RaopError;
pub use protocol::crypto::ServerKey;
pub use receiver::{
    AirTunesReceiver, AudioStream, DecoderRegistry, MacAddress, Metadata, ReceiverConfig, ReceiverError,
    ReceiverEvent,
};
