//! RTP receiver for a RAOP session
//!
//! Binds the audio, control and timing sockets handed out at `SETUP` and runs
//! one task per socket. Audio datagrams are decrypted and pushed into the
//! decode pipeline; control datagrams feed the heartbeat watchdog; timing
//! datagrams are read and dropped.

use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::audio_pipeline::SharedPipeline;
use crate::protocol::crypto::AudioCipher;
use crate::protocol::rtp::{RtpDecodeError, RtpPacket};

/// Maximum UDP packet size
const MAX_PACKET_SIZE: usize = 2048;

/// Random picks per socket before falling back to an ephemeral port
const BIND_ATTEMPTS: usize = 16;

/// Watchdog tick
const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);

/// Called when the control channel has been silent for the configured timeout
pub type TimeoutHandler = Arc<dyn Fn() + Send + Sync>;

/// Errors from RTP reception
#[derive(Debug, thiserror::Error)]
pub enum RtpReceiveError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid RTP packet
    #[error("Invalid RTP packet: {0}")]
    InvalidPacket(#[from] RtpDecodeError),
}

/// The three UDP ports of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPorts {
    /// Audio data
    pub audio: u16,
    /// Control / heartbeat
    pub control: u16,
    /// Timing
    pub timing: u16,
}

impl RtpPorts {
    /// `Transport` header value for the `SETUP` response
    #[must_use]
    pub fn transport_header(&self) -> String {
        format!(
            "RTP/AVP/UDP;unicast;mode=record;server_port={};control_port={};timing_port={}",
            self.audio, self.control, self.timing
        )
    }
}

/// Sockets bound at `SETUP`, not yet serviced
#[derive(Debug)]
pub struct RtpSockets {
    audio: UdpSocket,
    control: UdpSocket,
    timing: UdpSocket,
}

impl RtpSockets {
    /// Bind three distinct ports from `range`
    ///
    /// Ports are picked at random and verified by binding. A socket that finds
    /// no free port in the range after a few attempts takes an ephemeral one.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `RtpReceiveError::Io` if even an ephemeral bind fails.
    pub fn bind(ipv6: bool, range: &RangeInclusive<u16>) -> Result<Self, RtpReceiveError> {
        let mut taken = HashSet::new();
        let audio = bind_in_range(ipv6, range, &mut taken)?;
        let control = bind_in_range(ipv6, range, &mut taken)?;
        let timing = bind_in_range(ipv6, range, &mut taken)?;
        Ok(Self {
            audio,
            control,
            timing,
        })
    }

    /// Bound ports
    ///
    /// # Errors
    /// Returns `RtpReceiveError::Io` if a local address cannot be read.
    pub fn ports(&self) -> Result<RtpPorts, RtpReceiveError> {
        Ok(RtpPorts {
            audio: self.audio.local_addr()?.port(),
            control: self.control.local_addr()?.port(),
            timing: self.timing.local_addr()?.port(),
        })
    }
}

fn bind_in_range(
    ipv6: bool,
    range: &RangeInclusive<u16>,
    taken: &mut HashSet<u16>,
) -> Result<UdpSocket, RtpReceiveError> {
    let mut rng = rand::thread_rng();
    let attempts = if range.is_empty() { 0 } else { BIND_ATTEMPTS };

    let std_socket = (0..attempts)
        .filter_map(|_| {
            let port = rng.gen_range(range.clone());
            if port == 0 || taken.contains(&port) {
                return None;
            }
            std::net::UdpSocket::bind(unspecified(ipv6, port)).ok()
        })
        .next();

    let std_socket = match std_socket {
        Some(socket) => socket,
        None => {
            tracing::debug!("No free UDP port in {:?}, using an ephemeral one", range);
            std::net::UdpSocket::bind(unspecified(ipv6, 0))?
        }
    };

    std_socket.set_nonblocking(true)?;
    let socket = UdpSocket::from_std(std_socket)?;
    taken.insert(socket.local_addr()?.port());
    Ok(socket)
}

fn unspecified(ipv6: bool, port: u16) -> SocketAddr {
    if ipv6 {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))
    } else {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
    }
}

/// Running receiver: three socket tasks and, once heartbeats arrive, a watchdog
pub struct RtpReceiver {
    ports: RtpPorts,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RtpReceiver {
    /// Start servicing `sockets`
    ///
    /// `control_timeout` is in seconds; 0 disables the watchdog.
    ///
    /// # Errors
    /// Returns `RtpReceiveError::Io` if the bound ports cannot be read.
    pub fn start(
        sockets: RtpSockets,
        cipher: Option<AudioCipher>,
        pipeline: SharedPipeline,
        control_timeout: u32,
        on_timeout: TimeoutHandler,
    ) -> Result<Self, RtpReceiveError> {
        let ports = sockets.ports()?;
        let shutdown = CancellationToken::new();
        let RtpSockets {
            audio,
            control,
            timing,
        } = sockets;

        let tasks = vec![
            tokio::spawn(audio_loop(audio, cipher, pipeline, shutdown.clone())),
            tokio::spawn(control_loop(control, control_timeout, on_timeout, shutdown.clone())),
            tokio::spawn(timing_loop(timing, shutdown.clone())),
        ];

        tracing::info!(
            "RTP receiver listening (audio: {}, control: {}, timing: {})",
            ports.audio,
            ports.control,
            ports.timing
        );

        Ok(Self {
            ports,
            shutdown,
            tasks,
        })
    }

    /// Bound ports
    #[must_use]
    pub fn ports(&self) -> RtpPorts {
        self.ports
    }

    /// Still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stop the watchdog and close all sockets; safe to call repeatedly
    pub fn stop(&mut self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        // aborting drops the task futures and with them the sockets
        for task in self.tasks.drain(..) {
            task.abort();
        }
        tracing::debug!("RTP receiver stopped");
    }
}

impl Drop for RtpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RtpReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpReceiver")
            .field("ports", &self.ports)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

async fn audio_loop(
    socket: UdpSocket,
    cipher: Option<AudioCipher>,
    pipeline: SharedPipeline,
    shutdown: CancellationToken,
) {
    let mut buf = [0u8; MAX_PACKET_SIZE];

    loop {
        let len = tokio::select! {
            () = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, _src)) => len,
                Err(e) => {
                    tracing::warn!("Audio socket error: {}", e);
                    continue;
                }
            },
        };

        match decode_audio(&buf[..len], cipher.as_ref()) {
            Ok((sequence, chunk)) => {
                tracing::trace!("Audio packet seq={} len={}", sequence, chunk.len());
                pipeline.lock().await.add(chunk, sequence);
            }
            Err(e) => tracing::warn!("Dropping audio packet: {}", e),
        }
    }
}

/// Split one audio datagram into its sequence number and decrypted payload
///
/// # Errors
/// Returns `RtpReceiveError::InvalidPacket` for datagrams shorter than the
/// RTP header.
pub fn decode_audio(
    datagram: &[u8],
    cipher: Option<&AudioCipher>,
) -> Result<(u16, Bytes), RtpReceiveError> {
    let packet = RtpPacket::parse(datagram)?;
    let payload = match cipher {
        Some(cipher) => cipher.decrypt(packet.payload),
        None => packet.payload.to_vec(),
    };
    Ok((packet.header.sequence, Bytes::from(payload)))
}

async fn control_loop(
    socket: UdpSocket,
    control_timeout: u32,
    on_timeout: TimeoutHandler,
    shutdown: CancellationToken,
) {
    let silent_ticks = Arc::new(AtomicU32::new(0));
    let mut watchdog: Option<JoinHandle<()>> = None;
    let mut buf = [0u8; MAX_PACKET_SIZE];

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => {
                if let Err(e) = received {
                    tracing::warn!("Control socket error: {}", e);
                    continue;
                }
            }
        }

        silent_ticks.store(0, Ordering::SeqCst);

        if watchdog.is_none() && control_timeout > 0 {
            tracing::debug!("First control heartbeat, starting {}s watchdog", control_timeout);
            watchdog = Some(tokio::spawn(run_watchdog(
                silent_ticks.clone(),
                control_timeout,
                on_timeout.clone(),
                shutdown.clone(),
            )));
        }
    }

    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
}

async fn run_watchdog(
    silent_ticks: Arc<AtomicU32>,
    control_timeout: u32,
    on_timeout: TimeoutHandler,
    shutdown: CancellationToken,
) {
    let start = tokio::time::Instant::now() + WATCHDOG_PERIOD;
    let mut ticker = tokio::time::interval_at(start, WATCHDOG_PERIOD);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let ticks = silent_ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if ticks >= control_timeout {
            tracing::info!("Client timeout detected (no heartbeat in {} seconds)", control_timeout);
            on_timeout();
            return;
        }
    }
}

async fn timing_loop(socket: UdpSocket, shutdown: CancellationToken) {
    let mut buf = [0u8; MAX_PACKET_SIZE];

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => {
                if let Ok((len, src)) = received {
                    tracing::trace!("Ignoring {} byte timing packet from {}", len, src);
                }
            }
        }
    }
}
