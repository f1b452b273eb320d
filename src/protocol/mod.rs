//! Protocol module
//!
//! Sans-IO building blocks: nothing in here touches a socket.

#![allow(missing_docs)]

pub mod crypto;
pub mod daap;
pub mod raop;
pub mod rtp;
pub mod rtsp;
pub mod sdp;
