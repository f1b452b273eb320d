//! Test sender for driving a receiver over real sockets
//!
//! Plays the part of iTunes: writes RTSP requests on one TCP connection and
//! sends RTP datagrams to the ports the receiver hands out at `SETUP`.

#![allow(dead_code)]

use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use airtunes::protocol::rtsp::{Headers, Method, RtspResponse, StatusCode};
use airtunes::receiver::{AirTunesReceiver, DecoderRegistry, ReceiverConfig, ReceiverEvent};
use airtunes::ServerKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc::UnboundedReceiver;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One key per test binary; generation is slow
pub fn server_key() -> Arc<ServerKey> {
    static KEY: OnceLock<Arc<ServerKey>> = OnceLock::new();
    KEY.get_or_init(|| Arc::new(ServerKey::generate().expect("key generation")))
        .clone()
}

pub fn test_config() -> ReceiverConfig {
    ReceiverConfig::with_name("Integration")
        .port(0)
        .bind_address("127.0.0.1".parse().unwrap())
        .control_timeout(0)
}

/// Start a PCM-only receiver and wait for its `Started` event
pub async fn start_receiver(
    config: ReceiverConfig,
) -> (AirTunesReceiver, UnboundedReceiver<ReceiverEvent>, SocketAddr) {
    let mut receiver = AirTunesReceiver::new(config, server_key()).with_decoders(DecoderRegistry::pcm_only());
    let mut events = receiver.take_events().unwrap();
    let addr = receiver.start().await.unwrap();

    match next_event(&mut events).await {
        ReceiverEvent::Started { port, .. } => assert_eq!(port, addr.port()),
        other => panic!("Expected Started event, got {other:?}"),
    }
    (receiver, events, addr)
}

pub async fn next_event(events: &mut UnboundedReceiver<ReceiverEvent>) -> ReceiverEvent {
    tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

pub fn pcm_sdp(name: Option<&str>) -> String {
    let mut sdp = String::from(
        "v=0\r\n\
         o=iTunes 3413821438 0 IN IP4 127.0.0.1\r\n\
         s=iTunes\r\n\
         c=IN IP4 127.0.0.1\r\n\
         t=0 0\r\n\
         m=audio 0 RTP/AVP 96\r\n\
         a=rtpmap:96 L16/44100/2\r\n\
         a=fmtp:96 352 0 16 40 10 14 2 255 0 0 44100\r\n",
    );
    if let Some(name) = name {
        let _ = write!(sdp, "i={name}\r\n");
    }
    sdp
}

/// Server ports from a `SETUP` response
#[derive(Debug, Clone, Copy)]
pub struct ServerPorts {
    pub audio: u16,
    pub control: u16,
    pub timing: u16,
}

impl ServerPorts {
    pub fn from_response(response: &RtspResponse) -> Option<Self> {
        let transport = response.headers.get("Transport")?;
        let port = |name: &str| {
            transport
                .split(';')
                .find_map(|part| part.strip_prefix(name)?.strip_prefix('='))
                .and_then(|v| v.parse().ok())
        };
        Some(Self {
            audio: port("server_port")?,
            control: port("control_port")?,
            timing: port("timing_port")?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TestSenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection closed")]
    Closed,
    #[error("Invalid response")]
    InvalidResponse,
}

/// Minimal RAOP sender
pub struct TestSender {
    addr: SocketAddr,
    stream: TcpStream,
    buffer: Vec<u8>,
    cseq: u32,
    session_id: Option<String>,
    ports: Option<ServerPorts>,
    audio: Option<UdpSocket>,
    sequence: u16,
}

impl TestSender {
    pub async fn connect(addr: SocketAddr) -> Result<Self, TestSenderError> {
        Ok(Self {
            addr,
            stream: TcpStream::connect(addr).await?,
            buffer: Vec::new(),
            cseq: 0,
            session_id: None,
            ports: None,
            audio: None,
            sequence: 0,
        })
    }

    pub fn uri(&self) -> String {
        format!("rtsp://{}/3413821438", self.addr.ip())
    }

    pub fn ports(&self) -> Option<ServerPorts> {
        self.ports
    }

    /// Write a raw request without waiting for the answer
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), TestSenderError> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    pub async fn request(
        &mut self,
        method: Method,
        headers: &[(&str, &str)],
        body: Option<(&str, &[u8])>,
    ) -> Result<RtspResponse, TestSenderError> {
        self.cseq += 1;
        let mut head = format!("{} {} RTSP/1.0\r\nCSeq: {}\r\n", method.as_str(), self.uri(), self.cseq);
        if let Some(session) = &self.session_id {
            let _ = write!(head, "Session: {session}\r\n");
        }
        for (name, value) in headers {
            let _ = write!(head, "{name}: {value}\r\n");
        }
        if let Some((content_type, data)) = body {
            let _ = write!(head, "Content-Type: {content_type}\r\nContent-Length: {}\r\n", data.len());
        }
        head.push_str("\r\n");

        self.stream.write_all(head.as_bytes()).await?;
        if let Some((_, data)) = body {
            self.stream.write_all(data).await?;
        }
        self.read_response().await
    }

    pub async fn options(&mut self) -> Result<RtspResponse, TestSenderError> {
        self.request(Method::Options, &[], None).await
    }

    pub async fn announce(&mut self, sdp: &str) -> Result<RtspResponse, TestSenderError> {
        self.request(Method::Announce, &[], Some(("application/sdp", sdp.as_bytes())))
            .await
    }

    pub async fn setup(&mut self) -> Result<RtspResponse, TestSenderError> {
        let response = self
            .request(
                Method::Setup,
                &[("Transport", "RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;control_port=6001;timing_port=6002")],
                None,
            )
            .await?;

        if response.status == StatusCode::OK {
            self.session_id = response.headers.get("Session").map(ToString::to_string);
            self.ports = ServerPorts::from_response(&response);
            if let Some(ports) = self.ports {
                let socket = UdpSocket::bind("127.0.0.1:0").await?;
                socket.connect(SocketAddr::new(self.addr.ip(), ports.audio)).await?;
                self.audio = Some(socket);
            }
        }
        Ok(response)
    }

    pub async fn record(&mut self) -> Result<RtspResponse, TestSenderError> {
        let rtp_info = format!("seq={};rtptime=0", self.sequence);
        self.request(Method::Record, &[("Range", "npt=0-"), ("RTP-Info", &rtp_info)], None)
            .await
    }

    pub async fn set_volume(&mut self, db: f32) -> Result<RtspResponse, TestSenderError> {
        let body = format!("volume: {db:.6}\r\n");
        self.request(Method::SetParameter, &[], Some(("text/parameters", body.as_bytes())))
            .await
    }

    pub async fn teardown(&mut self) -> Result<RtspResponse, TestSenderError> {
        self.request(Method::Teardown, &[], None).await
    }

    /// Send one RTP audio packet with the next sequence number
    pub async fn send_audio(&mut self, payload: &[u8]) -> Result<u16, TestSenderError> {
        let socket = self.audio.as_ref().ok_or(TestSenderError::Closed)?;
        let seq = self.sequence;
        let timestamp = u32::from(seq) * 352;

        let mut packet = vec![0x80, 0x60];
        packet.extend_from_slice(&seq.to_be_bytes());
        packet.extend_from_slice(&timestamp.to_be_bytes());
        packet.extend_from_slice(&0x1234_5678u32.to_be_bytes());
        packet.extend_from_slice(payload);
        socket.send(&packet).await?;

        self.sequence = self.sequence.wrapping_add(1);
        Ok(seq)
    }

    /// Read one response, buffering anything that arrives after it
    pub async fn read_response(&mut self) -> Result<RtspResponse, TestSenderError> {
        loop {
            if let Some(response) = self.try_parse()? {
                return Ok(response);
            }
            let mut chunk = [0u8; 4096];
            let n = tokio::time::timeout(TIMEOUT, self.stream.read(&mut chunk))
                .await
                .map_err(|_| TestSenderError::Closed)??;
            if n == 0 {
                return Err(TestSenderError::Closed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// True once the receiver has closed the connection
    pub async fn is_closed(&mut self) -> bool {
        let mut chunk = [0u8; 64];
        matches!(
            tokio::time::timeout(TIMEOUT, self.stream.read(&mut chunk)).await,
            Ok(Ok(0) | Err(_))
        )
    }

    fn try_parse(&mut self) -> Result<Option<RtspResponse>, TestSenderError> {
        let Some(head_end) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
            return Ok(None);
        };
        let head = String::from_utf8_lossy(&self.buffer[..head_end]).into_owned();
        let mut lines = head.split("\r\n");

        let status_line = lines.next().ok_or(TestSenderError::InvalidResponse)?;
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().ok_or(TestSenderError::InvalidResponse)?.to_string();
        let status = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or(TestSenderError::InvalidResponse)?;
        let reason = parts.next().unwrap_or_default().to_string();

        let mut headers = Headers::new();
        for line in lines {
            let (name, value) = line.split_once(':').ok_or(TestSenderError::InvalidResponse)?;
            headers.insert(name.trim(), value.trim());
        }

        let body_len = headers.content_length().unwrap_or(0);
        let body_start = head_end + 4;
        if self.buffer.len() < body_start + body_len {
            return Ok(None);
        }
        let body = self.buffer[body_start..body_start + body_len].to_vec();
        self.buffer.drain(..body_start + body_len);

        Ok(Some(RtspResponse {
            version,
            status: StatusCode(status),
            reason,
            headers,
            body,
        }))
    }
}
