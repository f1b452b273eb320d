use thiserror::Error;

use super::SessionDescription;

#[derive(Debug, Error)]
pub enum SdpParseError {
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// SDP parser
pub struct SdpParser;

impl SdpParser {
    /// Parse SDP from string
    ///
    /// Lines are `type=value`, split on the first `=`. Lines without `=` are
    /// ignored, as are blank lines. Both CRLF and bare LF line endings are
    /// accepted.
    #[must_use]
    pub fn parse(input: &str) -> SessionDescription {
        let mut sdp = SessionDescription::default();

        for line in input.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            sdp.push(key, value);
        }

        sdp
    }
}
