//! Host interface enumeration
//!
//! Names, indexes, flags and hardware addresses come from
//! `pnet::datalink::interfaces()`; the MTU, which pnet does not report, from
//! a `SIOCGIFMTU` ioctl.

use linkpacket_core::{Error, Interface, Result};

/// All interfaces on the host, in kernel order
///
/// # Errors
/// The failure to open the MTU probe socket, if any.
pub fn interfaces() -> Result<Vec<Interface>> {
    sys::interfaces()
}

/// Look up one interface by name
///
/// # Errors
/// `InvalidArgument` when no interface has that name.
pub fn interface_by_name(name: &str) -> Result<Interface> {
    interfaces()?
        .into_iter()
        .find(|ifi| ifi.name == name)
        .ok_or_else(|| Error::invalid_argument(format!("no interface named {name:?}")))
}

#[cfg(unix)]
mod sys {
    use std::io;
    use std::os::fd::AsRawFd;

    use linkpacket_core::{Addr, Interface, InterfaceFlags, Result};
    use pnet::datalink::{self, NetworkInterface};
    use socket2::{Domain, Socket, Type};
    use tracing::{debug, trace};

    #[cfg(target_os = "linux")]
    const SIOCGIFMTU: u64 = 0x8921;
    #[cfg(not(target_os = "linux"))]
    const SIOCGIFMTU: u64 = 0xc020_6933;

    const IFNAMSIZ: usize = 16;

    /// `struct ifreq` with the `ifr_mtu` member of the union
    #[repr(C)]
    struct IfReqMtu {
        name: [u8; IFNAMSIZ],
        mtu: libc::c_int,
        pad: [u8; 20],
    }

    fn flags(raw: u32) -> InterfaceFlags {
        let table = [
            (libc::IFF_UP, InterfaceFlags::UP),
            (libc::IFF_BROADCAST, InterfaceFlags::BROADCAST),
            (libc::IFF_LOOPBACK, InterfaceFlags::LOOPBACK),
            (libc::IFF_POINTOPOINT, InterfaceFlags::POINT_TO_POINT),
            (libc::IFF_MULTICAST, InterfaceFlags::MULTICAST),
            (libc::IFF_PROMISC, InterfaceFlags::PROMISCUOUS),
        ];
        table
            .iter()
            .filter(|(bit, _)| raw & (*bit as u32) != 0)
            .fold(InterfaceFlags::empty(), |acc, (_, flag)| acc | *flag)
    }

    fn hardware_addr(ni: &NetworkInterface) -> Option<Addr> {
        let mac = ni.mac?;
        let bytes = [mac.0, mac.1, mac.2, mac.3, mac.4, mac.5];
        if bytes.iter().all(|b| *b == 0) {
            return None;
        }
        Some(Addr::from(bytes))
    }

    fn mtu(probe: &Socket, name: &str) -> io::Result<u32> {
        let bytes = name.as_bytes();
        if bytes.len() >= IFNAMSIZ {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "interface name too long",
            ));
        }
        let mut req = IfReqMtu {
            name: [0; IFNAMSIZ],
            mtu: 0,
            pad: [0; 20],
        };
        req.name[..bytes.len()].copy_from_slice(bytes);
        // SAFETY: req is a live ifreq-sized buffer for the duration of the call
        let rc = unsafe {
            libc::ioctl(
                probe.as_raw_fd(),
                SIOCGIFMTU as _,
                &mut req as *mut IfReqMtu,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(u32::try_from(req.mtu).unwrap_or(0))
    }

    fn convert(probe: &Socket, ni: &NetworkInterface) -> Interface {
        let mtu = mtu(probe, &ni.name).unwrap_or_else(|e| {
            debug!(interface = %ni.name, error = %e, "MTU unavailable");
            0
        });
        let mut ifi =
            Interface::new(ni.index, ni.name.as_str(), mtu).with_flags(flags(ni.flags));
        if let Some(addr) = hardware_addr(ni) {
            trace!(interface = %ni.name, addr = %addr, "Link-layer address");
            ifi = ifi.with_hardware_addr(addr);
        }
        ifi
    }

    pub(super) fn interfaces() -> Result<Vec<Interface>> {
        let probe = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
        let found: Vec<Interface> = datalink::interfaces()
            .iter()
            .map(|ni| convert(&probe, ni))
            .collect();
        debug!(count = found.len(), "Enumerated interfaces");
        Ok(found)
    }

}

#[cfg(not(unix))]
mod sys {
    use linkpacket_core::{Capability, Error, Interface, Result};

    pub(super) fn interfaces() -> Result<Vec<Interface>> {
        Err(Error::unsupported(Capability::Driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_loopback_present() {
        let all = interfaces().unwrap();
        let lo = all
            .iter()
            .find(|ifi| ifi.flags.contains(linkpacket_core::InterfaceFlags::LOOPBACK));
        assert!(lo.is_some(), "no loopback among {all:?}");
        assert!(lo.unwrap().index > 0);
    }

    #[test]
    fn test_unknown_name() {
        let err = interface_by_name("no-such-if0").unwrap_err();
        assert!(
            matches!(err, Error::InvalidArgument { .. }) || matches!(err, Error::Unsupported { .. })
        );
    }
}
