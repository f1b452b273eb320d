//! SDP (Session Description Protocol) for RAOP
//!
//! RAOP senders describe the stream in the `ANNOUNCE` body. Only a handful of
//! fields matter to a receiver, so the description is kept as a flat
//! multi-valued map rather than a full RFC 4566 model.

mod parser;
pub mod raop;


pub use parser::{SdpParseError, SdpParser};
pub use raop::{AnnounceError, AnnounceParameters, AudioCodec, DecoderConfig};

use std::collections::HashMap;

/// Field types that accumulate instead of overwriting
pub const MULTI_VALUED_FIELDS: [&str; 3] = ["a", "p", "b"];

/// Parsed session description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    /// Single-valued fields, last occurrence wins
    fields: HashMap<String, String>,
    /// `a`, `p` and `b` lines in order of appearance
    lists: HashMap<String, Vec<String>>,
}

impl SessionDescription {
    pub(crate) fn push(&mut self, key: &str, value: &str) {
        if MULTI_VALUED_FIELDS.contains(&key) {
            self.lists
                .entry(key.to_string())
                .or_default()
                .push(value.to_string());
        } else {
            self.fields.insert(key.to_string(), value.to_string());
        }
    }

    /// Value of a single-valued field (`v`, `o`, `s`, `i`, `c`, ...)
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// All values of a multi-valued field, in order
    #[must_use]
    pub fn values(&self, key: &str) -> &[String] {
        self.lists.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// `a=` lines split on the first colon into `(name, value)`
    ///
    /// A flag attribute without a colon yields an empty value.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values("a")
            .iter()
            .map(|entry| entry.split_once(':').unwrap_or((entry.as_str(), "")))
    }

    /// `a=` attribute with the given name; the last one wins when repeated
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes()
            .filter(|(key, _)| *key == name)
            .last()
            .map(|(_, value)| value)
    }

    /// Sender display name (`i=`)
    #[must_use]
    pub fn client_name(&self) -> Option<&str> {
        self.get("i")
    }

    /// True if the connection line (`c=`) names an IPv6 address
    #[must_use]
    pub fn is_ipv6(&self) -> bool {
        self.get("c").is_some_and(|c| c.contains("IP6"))
    }
}
