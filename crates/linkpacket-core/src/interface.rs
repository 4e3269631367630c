//! Network interface descriptions
//!
//! The values are plain data; `linkpacket-platform` fills them from the host.

use bitflags::bitflags;
use serde::Serialize;

use crate::addr::Addr;

bitflags! {
    /// Interface state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct InterfaceFlags: u32 {
        /// Administratively up
        const UP = 1 << 0;
        /// Supports broadcast
        const BROADCAST = 1 << 1;
        /// Loopback interface
        const LOOPBACK = 1 << 2;
        /// Point-to-point link
        const POINT_TO_POINT = 1 << 3;
        /// Supports multicast
        const MULTICAST = 1 << 4;
        /// Receives all frames
        const PROMISCUOUS = 1 << 5;
    }
}

/// A network interface a connection can be bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    /// Kernel interface index, positive
    pub index: u32,
    /// Interface name, such as `eth0` or `en0`
    pub name: String,
    /// Maximum transmission unit in bytes
    pub mtu: u32,
    /// Hardware address, if the link type has one
    pub hardware_addr: Option<Addr>,
    /// State flags
    pub flags: InterfaceFlags,
}

impl Interface {
    /// Describe an interface by hand
    pub fn new(index: u32, name: impl Into<String>, mtu: u32) -> Self {
        Self {
            index,
            name: name.into(),
            mtu,
            hardware_addr: None,
            flags: InterfaceFlags::empty(),
        }
    }

    /// Attach a hardware address
    #[must_use]
    pub fn with_hardware_addr(mut self, addr: Addr) -> Self {
        self.hardware_addr = Some(addr);
        self
    }

    /// Attach state flags
    #[must_use]
    pub fn with_flags(mut self, flags: InterfaceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Whether this looks like an Ethernet interface that is up
    pub fn is_ethernet_up(&self) -> bool {
        self.flags.contains(InterfaceFlags::UP)
            && !self.flags.contains(InterfaceFlags::LOOPBACK)
            && self.hardware_addr.is_some_and(|a| a.len() == 6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethernet_up() {
        let mac = Addr::from([0x02, 0, 0, 0, 0, 1]);
        let ifi = Interface::new(2, "eth0", 1500)
            .with_hardware_addr(mac)
            .with_flags(InterfaceFlags::UP | InterfaceFlags::BROADCAST);
        assert!(ifi.is_ethernet_up());

        let lo = Interface::new(1, "lo", 65536)
            .with_hardware_addr(Addr::from([0; 6]))
            .with_flags(InterfaceFlags::UP | InterfaceFlags::LOOPBACK);
        assert!(!lo.is_ethernet_up());

        let down = Interface::new(3, "eth1", 1500).with_hardware_addr(mac);
        assert!(!down.is_ethernet_up());
    }
}
