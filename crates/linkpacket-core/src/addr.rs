//! Hardware addresses
//!
//! [`Addr`] is the portable link-layer address used on both sides of the
//! driver boundary. It is a small `Copy` value; the valid length is stored
//! next to a fixed buffer so kernel decoding never allocates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result, NETWORK};

/// Longest hardware address accepted anywhere (the kernel `MAX_ADDR_LEN`)
///
/// Ethernet uses 6 bytes, IP over InfiniBand 20.
pub const MAX_ADDR_LEN: usize = 32;

/// A physical-layer address
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Addr {
    bytes: [u8; MAX_ADDR_LEN],
    len: u8,
}

impl Addr {
    /// Create an address from caller-supplied bytes
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for an empty slice or one longer
    /// than [`MAX_ADDR_LEN`].
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::invalid_argument("hardware address is empty"));
        }
        Self::from_valid_prefix(bytes, bytes.len())
    }

    /// Create an address from the first `valid_len` bytes of a kernel buffer
    ///
    /// A zero length is allowed here: link types without hardware addresses
    /// report one.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] when `valid_len` exceeds the buffer
    /// or [`MAX_ADDR_LEN`].
    pub fn from_valid_prefix(buf: &[u8], valid_len: usize) -> Result<Self> {
        if valid_len > MAX_ADDR_LEN {
            return Err(Error::invalid_argument(format!(
                "hardware address length {valid_len} exceeds maximum {MAX_ADDR_LEN}"
            )));
        }
        if valid_len > buf.len() {
            return Err(Error::invalid_argument(format!(
                "hardware address length {valid_len} exceeds buffer of {} bytes",
                buf.len()
            )));
        }

        let mut bytes = [0u8; MAX_ADDR_LEN];
        bytes[..valid_len].copy_from_slice(&buf[..valid_len]);
        Ok(Self {
            bytes,
            // valid_len <= MAX_ADDR_LEN, which fits in u8
            len: valid_len as u8,
        })
    }

    /// Significant address bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// Number of significant bytes
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Whether the address carries no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Network name, always `"packet"`
    pub fn network(&self) -> &'static str {
        NETWORK
    }
}

impl AsRef<[u8]> for Addr {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl TryFrom<&[u8]> for Addr {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes)
    }
}

impl From<[u8; 6]> for Addr {
    fn from(mac: [u8; 6]) -> Self {
        let mut bytes = [0u8; MAX_ADDR_LEN];
        bytes[..6].copy_from_slice(&mac);
        Self { bytes, len: 6 }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Addr({self})")
    }
}

impl FromStr for Addr {
    type Err = Error;

    /// Parse `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`
    fn from_str(s: &str) -> Result<Self> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let mut bytes = Vec::with_capacity(MAX_ADDR_LEN);
        for part in s.split(sep) {
            if part.len() != 2 {
                return Err(Error::invalid_argument(format!(
                    "malformed hardware address {s:?}"
                )));
            }
            let b = u8::from_str_radix(part, 16).map_err(|_| {
                Error::invalid_argument(format!("malformed hardware address {s:?}"))
            })?;
            bytes.push(b);
        }
        Self::new(&bytes)
    }
}

impl Serialize for Addr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Addr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethernet_display() {
        let addr = Addr::from([0x00, 0x1b, 0x21, 0xaa, 0xbb, 0xcc]);
        assert_eq!(addr.to_string(), "00:1b:21:aa:bb:cc");
        assert_eq!(addr.len(), 6);
        assert_eq!(addr.network(), "packet");
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(Addr::new(&[]), Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_oversized_rejected() {
        let long = [0xffu8; MAX_ADDR_LEN + 1];
        assert!(Addr::new(&long).is_err());
        assert!(Addr::new(&long[..MAX_ADDR_LEN]).is_ok());
    }

    #[test]
    fn test_valid_prefix_only() {
        let buf = [1, 2, 3, 4, 5, 6, 7, 8];
        let addr = Addr::from_valid_prefix(&buf, 6).unwrap();
        assert_eq!(addr.as_bytes(), &[1, 2, 3, 4, 5, 6]);

        let none = Addr::from_valid_prefix(&buf, 0).unwrap();
        assert!(none.is_empty());

        assert!(Addr::from_valid_prefix(&buf, 9).is_err());
    }

    #[test]
    fn test_parse() {
        let addr: Addr = "de:ad:BE:ef:00:01".parse().unwrap();
        assert_eq!(addr.as_bytes(), &[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);

        let dashed: Addr = "de-ad-be-ef-00-01".parse().unwrap();
        assert_eq!(addr, dashed);

        assert!("de:ad:be".parse::<Addr>().is_ok());
        assert!("dead:beef".parse::<Addr>().is_err());
        assert!("zz:00".parse::<Addr>().is_err());
        assert!("".parse::<Addr>().is_err());
    }
}
