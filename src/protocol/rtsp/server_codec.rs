//! Request framing and response serialization for the receiver side

use std::fmt::Write;
use std::str::FromStr;

use bytes::{Buf, BytesMut};

use super::headers::{content_types, names, raop};
use super::{Headers, Method, RtspRequest, RtspResponse, StatusCode};

/// Why a request could not be framed
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid request line: {0}")]
    InvalidRequestLine(String),

    /// The framing was fine but the method is not one a receiver answers.
    /// The `CSeq` is kept so the rejection can still echo it.
    #[error("Invalid method: {method}")]
    InvalidMethod { method: String, cseq: Option<String> },

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("Body too large: {size} > {max}")]
    BodyTooLarge { size: usize, max: usize },

    #[error("Invalid UTF-8 in headers")]
    InvalidUtf8,
}

impl ParseError {
    /// `CSeq` of the rejected request, when it could be recovered
    #[must_use]
    pub fn cseq(&self) -> Option<&str> {
        match self {
            ParseError::InvalidMethod { cseq, .. } => cseq.as_deref(),
            _ => None,
        }
    }
}

/// Artwork is the largest thing senders push
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

const MAX_HEADER_SIZE: usize = 64 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

const RTSP_VERSION: &str = "RTSP/1.0";

/// Request line and headers, before the method is checked
struct RequestHead {
    method: String,
    uri: String,
    headers: Headers,
}

impl RequestHead {
    fn parse(text: &str) -> Result<Self, ParseError> {
        let mut lines = text.lines();
        let request_line = lines.next().unwrap_or_default();

        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(uri), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ParseError::InvalidRequestLine(request_line.to_string()));
        };
        if !version.starts_with("RTSP/") {
            return Err(ParseError::InvalidRequestLine(format!("Invalid protocol: {version}")));
        }

        let headers = lines
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.split_once(':')
                    .map(|(name, value)| (name.trim(), value.trim()))
                    .ok_or_else(|| ParseError::InvalidHeader(line.to_string()))
            })
            .collect::<Result<Headers, _>>()?;

        Ok(Self {
            method: method.to_string(),
            uri: uri.to_string(),
            headers,
        })
    }

    fn content_length(&self) -> Result<usize, ParseError> {
        let Some(value) = self.headers.get(names::CONTENT_LENGTH) else {
            return Ok(0);
        };
        let length = value
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidContentLength(value.to_string()))?;
        if length > MAX_BODY_SIZE {
            return Err(ParseError::BodyTooLarge {
                size: length,
                max: MAX_BODY_SIZE,
            });
        }
        Ok(length)
    }
}

/// Sans-IO request decoder
///
/// Bytes go in with [`feed`](Self::feed); complete requests come out of
/// [`decode`](Self::decode), one per call, so pipelined requests are answered
/// in order.
///
/// ```rust
/// use airtunes::protocol::rtsp::{Method, RtspServerCodec};
///
/// let mut codec = RtspServerCodec::new();
/// codec.feed(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n");
///
/// let request = codec.decode().unwrap().unwrap();
/// assert_eq!(request.method, Method::Options);
/// ```
#[derive(Debug, Default)]
pub struct RtspServerCodec {
    buffer: BytesMut,
}

impl RtspServerCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet consumed by a request
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Take the next complete request off the buffer
    ///
    /// `Ok(None)` means more bytes are needed. A request with an unknown
    /// method is consumed before `ParseError::InvalidMethod` is returned, so
    /// the next request can still be decoded.
    ///
    /// # Errors
    /// Returns `ParseError` if the request is malformed.
    pub fn decode(&mut self) -> Result<Option<RtspRequest>, ParseError> {
        let Some(head_len) = self
            .buffer
            .windows(HEADER_TERMINATOR.len())
            .position(|window| window == HEADER_TERMINATOR)
        else {
            if self.buffer.len() > MAX_HEADER_SIZE {
                return Err(ParseError::InvalidHeader("Headers too large".into()));
            }
            return Ok(None);
        };

        let text = std::str::from_utf8(&self.buffer[..head_len]).map_err(|_| ParseError::InvalidUtf8)?;
        let head = RequestHead::parse(text)?;
        let body_len = head.content_length()?;

        let body_start = head_len + HEADER_TERMINATOR.len();
        if self.buffer.len() < body_start + body_len {
            return Ok(None);
        }
        self.buffer.advance(body_start);
        let body = self.buffer.split_to(body_len).to_vec();

        let RequestHead { method, uri, headers } = head;
        let Ok(method) = Method::from_str(&method) else {
            return Err(ParseError::InvalidMethod {
                cseq: headers.cseq_raw().map(str::to_string),
                method,
            });
        };

        Ok(Some(RtspRequest {
            method,
            uri,
            headers,
            body,
        }))
    }
}

/// Response under construction by a method handler
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl ResponseBuilder {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    #[must_use]
    pub fn error(status: StatusCode) -> Self {
        Self::new(status)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Echo the request's `CSeq` verbatim; nothing is invented when absent
    #[must_use]
    pub fn cseq(self, cseq: Option<&str>) -> Self {
        match cseq {
            Some(cseq) => self.header(names::CSEQ, cseq),
            None => self,
        }
    }

    /// `Server: AirTunes/105.1`
    #[must_use]
    pub fn server_identity(self) -> Self {
        self.header(raop::SERVER, raop::SERVER_IDENTITY)
    }

    #[must_use]
    pub fn session(self, session_id: &str) -> Self {
        self.header(names::SESSION, session_id)
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// `text/parameters` body
    #[must_use]
    pub fn text_body(mut self, body: &str) -> Self {
        self.body = body.as_bytes().to_vec();
        self.header(names::CONTENT_TYPE, content_types::TEXT_PARAMETERS)
    }

    /// `Audio-Latency` in samples, sent at `RECORD`
    #[must_use]
    pub fn audio_latency(self, samples: u32) -> Self {
        self.header(raop::AUDIO_LATENCY, &samples.to_string())
    }

    /// Finish; `Content-Length` is added when there is a body
    #[must_use]
    pub fn build(mut self) -> RtspResponse {
        if !self.body.is_empty() {
            self.headers.insert(names::CONTENT_LENGTH, self.body.len().to_string());
        }

        RtspResponse {
            version: RTSP_VERSION.to_string(),
            status: self.status,
            reason: self.status.reason().to_string(),
            headers: self.headers,
            body: self.body,
        }
    }

    #[must_use]
    pub fn encode(self) -> Vec<u8> {
        encode_response(&self.build())
    }
}

/// Serialize a response for the wire
#[must_use]
pub fn encode_response(response: &RtspResponse) -> Vec<u8> {
    let mut head = format!(
        "{} {} {}\r\n",
        response.version,
        response.status.as_u16(),
        response.reason
    );
    for (name, value) in response.headers.iter() {
        let _ = write!(head, "{name}: {value}\r\n");
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(&response.body);
    out
}
