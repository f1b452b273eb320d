//! Receiver configuration

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::RangeInclusive;
use std::str::FromStr;

use rand::RngCore;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Not six hex octets
    #[error("invalid MAC address: {0}")]
    InvalidMacAddress(String),

    /// Empty or reversed UDP port range
    #[error("invalid RTP port range {start}..={end}")]
    InvalidPortRange {
        /// First port
        start: u16,
        /// Last port
        end: u16,
    },
}

/// Hardware address used in the device challenge and the service name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Wrap raw octets
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Random locally administered unicast address
    #[must_use]
    pub fn random() -> Self {
        let mut octets = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut octets);
        octets[0] = (octets[0] | 0x02) & 0xFE;
        Self(octets)
    }

    /// Raw octets
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = ConfigError;

    /// Accepts `AA:BB:CC:DD:EE:FF`, `AA-BB-CC-DD-EE-FF` or `AABBCCDDEEFF`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidMacAddress(s.to_string());

        let hex: String = s.trim().chars().filter(|c| !matches!(c, ':' | '-')).collect();
        if hex.len() != 12 || !hex.is_ascii() {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for octet in self.0 {
            write!(f, "{octet:02X}")?;
        }
        Ok(())
    }
}

/// Receiver configuration
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Device name shown to senders
    pub name: String,

    /// Hardware address
    pub mac_address: MacAddress,

    /// Password for digest authentication (None = open)
    pub password: Option<String>,

    /// Seconds without a control heartbeat before the client is dropped
    /// (0 = never)
    pub control_timeout: u32,

    /// Log every request at info level
    pub verbose: bool,

    /// RTSP listen port (0 = auto-assign)
    pub port: u16,

    /// RTSP listen address
    pub bind_address: IpAddr,

    /// Latency reported in the `RECORD` response, in samples
    pub audio_latency: u32,

    /// Decoded chunks the output stream holds before pushing back
    pub output_buffer_chunks: usize,

    /// UDP ports handed out at `SETUP`
    pub rtp_port_range: RangeInclusive<u16>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            name: "AirTunes Receiver".to_string(),
            mac_address: MacAddress::random(),
            password: None,
            control_timeout: 5,
            verbose: false,
            port: 5000,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            audio_latency: 11025,
            output_buffer_chunks: super::audio_pipeline::DEFAULT_OUTPUT_CHUNKS,
            rtp_port_range: 5000..=9999,
        }
    }
}

impl ReceiverConfig {
    /// Create with custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set hardware address
    #[must_use]
    pub fn mac_address(mut self, mac: MacAddress) -> Self {
        self.mac_address = mac;
        self
    }

    /// Require a password
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set control heartbeat timeout in seconds
    #[must_use]
    pub fn control_timeout(mut self, seconds: u32) -> Self {
        self.control_timeout = seconds;
        self
    }

    /// Enable verbose request logging
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set listen address
    #[must_use]
    pub fn bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Set reported audio latency
    #[must_use]
    pub fn audio_latency(mut self, samples: u32) -> Self {
        self.audio_latency = samples;
        self
    }

    /// Set the output stream high-water mark
    #[must_use]
    pub fn output_buffer_chunks(mut self, chunks: usize) -> Self {
        self.output_buffer_chunks = chunks;
        self
    }

    /// Set the UDP port range for `SETUP`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPortRange` for an empty range.
    pub fn rtp_port_range(mut self, range: RangeInclusive<u16>) -> Result<Self, ConfigError> {
        if range.is_empty() {
            return Err(ConfigError::InvalidPortRange {
                start: *range.start(),
                end: *range.end(),
            });
        }
        self.rtp_port_range = range;
        Ok(self)
    }

    /// Digest auth is on
    #[must_use]
    pub fn requires_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Bonjour instance name, `<MAC>@<name>`
    #[must_use]
    pub fn service_name(&self) -> String {
        format!("{}@{}", self.mac_address, self.name)
    }

    /// `_raop._tcp` TXT records for an external advertiser
    #[must_use]
    pub fn txt_records(&self) -> Vec<(&'static str, String)> {
        let pw = if self.requires_password() { "true" } else { "false" };

        [
            ("txtvers", "1"),
            ("ch", "2"),
            ("cn", "0,1"),
            ("et", "0,1"),
            ("sv", "false"),
            ("da", "true"),
            ("sr", "44100"),
            ("ss", "16"),
            ("pw", pw),
            ("vn", "65537"),
            ("tp", "UDP"),
            ("md", "0,1,2"),
            ("vs", "105.1"),
            ("sm", "false"),
            ("ek", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
    }
}
