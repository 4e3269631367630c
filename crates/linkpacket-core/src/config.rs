//! Connection configuration
//!
//! [`Config`] is built by the caller before a connection is established and
//! is never retained by the connection. It can be stored as TOML:
//!
//! ```toml
//! direction = "in"
//!
//! [[filter]]
//! op = 0x28
//! k = 12
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filter::{self, RawInstruction};

/// Socket type used when establishing a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketType {
    /// Full frames including the link-layer header
    Raw,
    /// Link-layer header removed on receive and built by the kernel on send
    Datagram,
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketType::Raw => f.write_str("raw"),
            SocketType::Datagram => f.write_str("datagram"),
        }
    }
}

impl FromStr for SocketType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(SocketType::Raw),
            "datagram" | "dgram" => Ok(SocketType::Datagram),
            _ => Err(Error::invalid_argument(format!("unknown socket type {s:?}"))),
        }
    }
}

/// Traffic direction captured by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Only frames arriving at the host
    In,
    /// Only frames leaving the host
    Out,
    /// Both directions
    #[default]
    InOut,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => f.write_str("in"),
            Direction::Out => f.write_str("out"),
            Direction::InOut => f.write_str("in-out"),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "in-out" | "inout" | "both" => Ok(Direction::InOut),
            _ => Err(Error::invalid_argument(format!("unknown direction {s:?}"))),
        }
    }
}

/// Link-layer protocol number in host byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EtherType(u16);

impl EtherType {
    /// Every protocol (Linux `ETH_P_ALL`)
    pub const ALL: EtherType = EtherType(0x0003);
    /// IPv4
    pub const IPV4: EtherType = EtherType(0x0800);
    /// ARP
    pub const ARP: EtherType = EtherType(0x0806);
    /// 802.1Q VLAN tag
    pub const VLAN: EtherType = EtherType(0x8100);
    /// IPv6
    pub const IPV6: EtherType = EtherType(0x86dd);

    /// Wrap a host-order value
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Host-order value
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Value in wire (big-endian) byte order, as stored in kernel structures
    pub const fn to_network(self) -> u16 {
        self.0.to_be()
    }

    /// Inverse of [`EtherType::to_network`]
    pub const fn from_network(raw: u16) -> Self {
        Self(u16::from_be(raw))
    }
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl TryFrom<u32> for EtherType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        u16::try_from(value)
            .map(Self)
            .map_err(|_| Error::invalid_argument(format!("protocol value {value} out of range")))
    }
}

impl TryFrom<i64> for EtherType {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        u16::try_from(value)
            .map(Self)
            .map_err(|_| Error::invalid_argument(format!("protocol value {value} out of range")))
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl FromStr for EtherType {
    type Err = Error;

    /// Accepts `ipv4`, `arp`, `ipv6`, `vlan`, `all`, hex (`0x0800`) or decimal
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => return Ok(Self::ALL),
            "ipv4" | "ip" => return Ok(Self::IPV4),
            "arp" => return Ok(Self::ARP),
            "ipv6" => return Ok(Self::IPV6),
            "vlan" => return Ok(Self::VLAN),
            _ => {}
        }

        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse::<u32>(),
        };
        let value =
            parsed.map_err(|_| Error::invalid_argument(format!("malformed protocol {s:?}")))?;
        Self::try_from(value)
    }
}

/// Options applied when a connection is established
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Classifier program, empty for none
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<RawInstruction>,
    /// Direction of captured traffic
    pub direction: Direction,
}

impl Config {
    /// Default configuration: no filter, both directions
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the classifier program
    #[must_use]
    pub fn with_filter(mut self, filter: Vec<RawInstruction>) -> Self {
        self.filter = filter;
        self
    }

    /// Set the direction
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// I/O failures reading the file, or any [`Config::from_toml`] error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] on malformed TOML or an invalid filter.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::invalid_argument(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::invalid_argument(format!("config: {e}")))
    }

    /// Validate the classifier program
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] describing the first bad instruction.
    pub fn validate(&self) -> Result<()> {
        if self.filter.is_empty() {
            return Ok(());
        }
        filter::validate(&self.filter)
    }
}
