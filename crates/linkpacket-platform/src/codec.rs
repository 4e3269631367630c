//! Link-layer socket address encoding
//!
//! The kernel `sockaddr_ll` declares an 8-byte address field, but the
//! address length it reports may be larger (20 bytes for IP over
//! InfiniBand); the kernel reads and writes past the declared field into the
//! surrounding storage. [`RawSockaddrLinklayer`] therefore carries a
//! [`MAX_ADDR_LEN`] buffer and encodes to plain bytes that the Linux driver
//! copies into a `sockaddr_storage`.

use linkpacket_core::{Addr, EtherType, Error, Result, MAX_ADDR_LEN};

/// `AF_PACKET` address family
pub const AF_PACKET: u16 = 17;

/// Size of the kernel `struct sockaddr_ll`
pub const SOCKADDR_LL_LEN: usize = 20;

/// Offset of the address bytes within `struct sockaddr_ll`
pub const ADDR_OFFSET: usize = 12;

/// Encoded size of [`RawSockaddrLinklayer`]
pub const ENCODED_LEN: usize = ADDR_OFFSET + MAX_ADDR_LEN;

/// A link-layer socket address with room for any hardware address
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSockaddrLinklayer {
    /// Always [`AF_PACKET`]
    pub family: u16,
    /// Protocol in network byte order
    pub protocol: u16,
    /// Interface index
    pub ifindex: i32,
    /// ARP hardware type
    pub hatype: u16,
    /// Packet type (host, broadcast, outgoing, ...)
    pub pkttype: u8,
    /// Number of valid bytes in `addr`
    pub halen: u8,
    /// Hardware address
    pub addr: [u8; MAX_ADDR_LEN],
}

const _: () = assert!(std::mem::size_of::<RawSockaddrLinklayer>() == ENCODED_LEN);

impl RawSockaddrLinklayer {
    /// Address used to bind a socket to an interface and protocol
    pub fn bind(ifindex: i32, protocol: EtherType) -> Self {
        Self {
            family: AF_PACKET,
            protocol: protocol.to_network(),
            ifindex,
            ..Self::default()
        }
    }

    /// Destination address for a frame sent on `ifindex`
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an empty address or one that does not
    /// fit the address field.
    pub fn encode(addr: &Addr, ifindex: i32, protocol: EtherType) -> Result<Self> {
        if addr.is_empty() {
            return Err(Error::invalid_argument("destination hardware address is empty"));
        }
        if addr.len() > MAX_ADDR_LEN {
            return Err(Error::invalid_argument(format!(
                "destination hardware address of {} bytes exceeds {MAX_ADDR_LEN}",
                addr.len()
            )));
        }

        let mut raw = Self::bind(ifindex, protocol);
        raw.addr[..addr.len()].copy_from_slice(addr.as_bytes());
        // addr.len() <= MAX_ADDR_LEN
        raw.halen = addr.len() as u8;
        Ok(raw)
    }

    /// Length to hand to the kernel: the full structure, or more when the
    /// address overflows the declared 8-byte field
    pub fn socklen(&self) -> usize {
        SOCKADDR_LL_LEN.max(ADDR_OFFSET + usize::from(self.halen))
    }

    /// Encode in native byte order, as laid out in memory
    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        let mut out = [0u8; ENCODED_LEN];
        out[0..2].copy_from_slice(&self.family.to_ne_bytes());
        out[2..4].copy_from_slice(&self.protocol.to_ne_bytes());
        out[4..8].copy_from_slice(&self.ifindex.to_ne_bytes());
        out[8..10].copy_from_slice(&self.hatype.to_ne_bytes());
        out[10] = self.pkttype;
        out[11] = self.halen;
        out[ADDR_OFFSET..].copy_from_slice(&self.addr);
        out
    }

    /// Decode the bytes the kernel filled in
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] when the buffer is shorter than the header
    /// or than the address length it reports, or that length exceeds
    /// [`MAX_ADDR_LEN`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ADDR_OFFSET {
            return Err(Error::invalid_argument(format!(
                "link-layer address of {} bytes is truncated",
                bytes.len()
            )));
        }
        let halen = bytes[11];
        let len = usize::from(halen);
        if len > MAX_ADDR_LEN {
            return Err(Error::invalid_argument(format!(
                "hardware address length {len} exceeds maximum {MAX_ADDR_LEN}"
            )));
        }
        if ADDR_OFFSET + len > bytes.len() {
            return Err(Error::invalid_argument(format!(
                "hardware address length {len} exceeds the {} bytes returned",
                bytes.len() - ADDR_OFFSET
            )));
        }

        let mut addr = [0u8; MAX_ADDR_LEN];
        addr[..len].copy_from_slice(&bytes[ADDR_OFFSET..ADDR_OFFSET + len]);
        Ok(Self {
            family: u16::from_ne_bytes([bytes[0], bytes[1]]),
            protocol: u16::from_ne_bytes([bytes[2], bytes[3]]),
            ifindex: i32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            hatype: u16::from_ne_bytes([bytes[8], bytes[9]]),
            pkttype: bytes[10],
            halen,
            addr,
        })
    }

    /// Protocol in host byte order
    pub fn ether_type(&self) -> EtherType {
        EtherType::from_network(self.protocol)
    }

    /// The hardware address, possibly empty
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `halen` exceeds the address field.
    pub fn hardware_addr(&self) -> Result<Addr> {
        Addr::from_valid_prefix(&self.addr, usize::from(self.halen))
    }
}
