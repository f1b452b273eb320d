use std::borrow::Cow;
use std::fmt::Write;

use super::{Headers, Method, headers::names};

/// A framed RTSP request
#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: Method,
    /// `*` or `rtsp://<host>/<session>`
    pub uri: String,
    pub headers: Headers,
    /// Exactly `Content-Length` bytes; empty when the header is absent
    pub body: Vec<u8>,
}

impl RtspRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn builder(method: Method, uri: impl Into<String>) -> RtspRequestBuilder {
        RtspRequestBuilder {
            request: Self::new(method, uri),
        }
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Serialize for the wire
    ///
    /// `Content-Length` is always derived from the body, never copied from
    /// the header list. Used by tests and the demo to play the sender side.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut head = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);
        for (name, value) in self
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(names::CONTENT_LENGTH))
        {
            let _ = write!(head, "{name}: {value}\r\n");
        }
        if !self.body.is_empty() {
            let _ = write!(head, "{}: {}\r\n", names::CONTENT_LENGTH, self.body.len());
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Incremental [`RtspRequest`] construction
#[derive(Debug)]
pub struct RtspRequestBuilder {
    request: RtspRequest,
}

impl RtspRequestBuilder {
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn cseq(self, seq: u32) -> Self {
        self.header(names::CSEQ, seq.to_string())
    }

    #[must_use]
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(names::CONTENT_TYPE, content_type)
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request.body = body.into();
        self
    }

    #[must_use]
    pub fn build(self) -> RtspRequest {
        self.request
    }
}
