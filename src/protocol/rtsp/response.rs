use std::fmt;

use super::Headers;

/// Status codes a receiver sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const UNSUPPORTED_MEDIA_TYPE: StatusCode = StatusCode(415);
    pub const NOT_ENOUGH_BANDWIDTH: StatusCode = StatusCode(453);
    pub const METHOD_NOT_VALID_IN_STATE: StatusCode = StatusCode(455);
    pub const INTERNAL_ERROR: StatusCode = StatusCode(500);

    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// 2xx
    #[must_use]
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Standard reason phrase, `"Unknown"` for codes this crate never sends
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            415 => "Unsupported Media Type",
            453 => "Not Enough Bandwidth",
            455 => "Method Not Valid in This State",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

/// An RTSP response
#[derive(Debug, Clone)]
pub struct RtspResponse {
    /// Always `RTSP/1.0` for responses built here
    pub version: String,
    pub status: StatusCode,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl RtspResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.headers.cseq()
    }

    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.headers.session()
    }
}
