/// Header names shared with plain RTSP
pub mod names {
    pub const CSEQ: &str = "CSeq";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const SESSION: &str = "Session";
    pub const TRANSPORT: &str = "Transport";
    pub const PUBLIC: &str = "Public";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
    pub const RTP_INFO: &str = "RTP-Info";
}

/// Headers only AirTunes speaks
pub mod raop {
    /// Base64 nonce a sender asks the device to sign
    pub const APPLE_CHALLENGE: &str = "Apple-Challenge";
    /// Signed answer to `Apple-Challenge`
    pub const APPLE_RESPONSE: &str = "Apple-Response";
    /// Output latency in samples, sent at `RECORD`
    pub const AUDIO_LATENCY: &str = "Audio-Latency";
    pub const AUDIO_JACK_STATUS: &str = "Audio-Jack-Status";
    pub const SERVER: &str = "Server";
    /// Value of the `Server` header
    pub const SERVER_IDENTITY: &str = "AirTunes/105.1";
}

/// Content types carried by `ANNOUNCE` and `SET_PARAMETER`
pub mod content_types {
    pub const SDP: &str = "application/sdp";
    pub const DMAP: &str = "application/x-dmap-tagged";
    pub const TEXT_PARAMETERS: &str = "text/parameters";
    pub const JPEG: &str = "image/jpeg";
    pub const NO_IMAGE: &str = "image/none";
}

/// Ordered header list with case-insensitive names
///
/// Insertion order is kept so responses go out in the order handlers built
/// them. Names keep the casing of the last insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any existing value in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Remove a header, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let i = self.position(name)?;
        Some(self.entries.remove(i).1)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// `CSeq` exactly as the sender wrote it
    #[must_use]
    pub fn cseq_raw(&self) -> Option<&str> {
        self.get(names::CSEQ)
    }

    /// `CSeq` as a number, `None` if absent or not numeric
    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.cseq_raw()?.trim().parse().ok()
    }

    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get(names::CONTENT_LENGTH)?.trim().parse().ok()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.get(names::CONTENT_TYPE)
    }

    /// Content type without parameters, lowercased
    ///
    /// `Text/Parameters; charset=utf-8` becomes `text/parameters`.
    #[must_use]
    pub fn media_type(&self) -> Option<String> {
        let content_type = self.content_type()?;
        let essence = content_type.split(';').next().unwrap_or(content_type);
        Some(essence.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.get(names::SESSION)
    }

    /// Headers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}
