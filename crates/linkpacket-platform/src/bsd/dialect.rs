//! Per-OS differences in the BPF device interface

use linkpacket_core::{Capability, Direction, Error, Result};

use super::ioctl;

/// Capture header size on most BSDs (`struct bpf_hdr` with 32-bit timestamps)
pub const BPF_HEADER_LEN: usize = 18;

/// Capture header size on FreeBSD (`struct bpf_xhdr` with 64-bit timestamps)
pub const BPF_XHEADER_LEN: usize = 26;

/// OpenBSD `BPF_DIRECTION_IN`
pub const BPF_DIRECTION_IN: u32 = 1;

/// OpenBSD `BPF_DIRECTION_OUT`
pub const BPF_DIRECTION_OUT: u32 = 2;

/// Flavour of the BPF device interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Darwin and DragonFly
    Generic,
    /// FreeBSD: extended capture header
    FreeBsd,
    /// NetBSD: different `BIOCSSEESENT` number
    NetBsd,
    /// OpenBSD: `BIOCSDIRFILT` instead of `BIOCSSEESENT`
    OpenBsd,
}

/// The ioctl that applies a direction, and its argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionRequest {
    /// Request number
    pub request: u64,
    /// `u_int` argument
    pub value: u32,
}

impl Dialect {
    /// Dialect of the running system
    pub const fn host() -> Self {
        if cfg!(target_os = "freebsd") {
            Dialect::FreeBsd
        } else if cfg!(target_os = "netbsd") {
            Dialect::NetBsd
        } else if cfg!(target_os = "openbsd") {
            Dialect::OpenBsd
        } else {
            Dialect::Generic
        }
    }

    /// Length of the header preceding each captured frame
    pub const fn header_len(self) -> usize {
        match self {
            Dialect::FreeBsd => BPF_XHEADER_LEN,
            _ => BPF_HEADER_LEN,
        }
    }

    /// How to restrict capture to `direction`
    ///
    /// OpenBSD filters by naming the direction to drop: `In` drops outbound
    /// frames, `Out` drops inbound ones. Elsewhere the device can only be
    /// told whether to see sent frames, so `Out` cannot be expressed.
    ///
    /// # Errors
    /// [`Error::Unsupported`] for [`Direction::Out`] outside OpenBSD.
    pub fn direction_request(self, direction: Direction) -> Result<DirectionRequest> {
        if self == Dialect::OpenBsd {
            let value = match direction {
                Direction::In => BPF_DIRECTION_OUT,
                Direction::Out => BPF_DIRECTION_IN,
                Direction::InOut => 0,
            };
            return Ok(DirectionRequest {
                request: ioctl::BIOCSDIRFILT,
                value,
            });
        }

        let request = if self == Dialect::NetBsd {
            ioctl::BIOCSSEESENT_NETBSD
        } else {
            ioctl::BIOCSSEESENT
        };
        let value = match direction {
            Direction::In => 0,
            Direction::InOut => 1,
            Direction::Out => return Err(Error::unsupported(Capability::Direction(direction))),
        };
        Ok(DirectionRequest { request, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lengths() {
        assert_eq!(Dialect::Generic.header_len(), 18);
        assert_eq!(Dialect::NetBsd.header_len(), 18);
        assert_eq!(Dialect::OpenBsd.header_len(), 18);
        assert_eq!(Dialect::FreeBsd.header_len(), 26);
    }

    #[test]
    fn test_seesent_mapping() {
        for dialect in [Dialect::Generic, Dialect::FreeBsd] {
            let req = dialect.direction_request(Direction::In).unwrap();
            assert_eq!(req, DirectionRequest { request: ioctl::BIOCSSEESENT, value: 0 });
            let req = dialect.direction_request(Direction::InOut).unwrap();
            assert_eq!(req.value, 1);
            assert!(matches!(
                dialect.direction_request(Direction::Out),
                Err(Error::Unsupported { capability: Capability::Direction(Direction::Out), .. })
            ));
        }
    }

    #[test]
    fn test_netbsd_request_number() {
        let req = Dialect::NetBsd.direction_request(Direction::InOut).unwrap();
        assert_eq!(req.request, ioctl::BIOCSSEESENT_NETBSD);
        assert_eq!(req.value, 1);
    }

    #[test]
    fn test_openbsd_mapping() {
        let map = |d| Dialect::OpenBsd.direction_request(d).unwrap();
        assert_eq!(map(Direction::In).value, BPF_DIRECTION_OUT);
        assert_eq!(map(Direction::Out).value, BPF_DIRECTION_IN);
        assert_eq!(map(Direction::InOut).value, 0);
        assert_eq!(map(Direction::In).request, ioctl::BIOCSDIRFILT);
    }
}
