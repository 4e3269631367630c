//! # linkpacket platform
//!
//! Kernel drivers and the [`Conn`] connection type.
//!
//! ## Drivers
//!
//! - **Linux** - `AF_PACKET` sockets (`LinuxDriver`)
//! - **BSD family** - `/dev/bpf` capture devices (`BsdDriver`) on macOS, iOS,
//!   FreeBSD, NetBSD, OpenBSD and DragonFly
//! - **Everything else** - [`NullDriver`], which reports every operation as
//!   unsupported
//! - **Tests** - `MockDriver`, an in-memory device running filters in the
//!   userspace interpreter, behind the `mock` feature
//!
//! [`open`] picks the driver for the host at compile time.
//!
//! ## Example
//!
//! ```no_run
//! use linkpacket_platform::{interface_by_name, Conn};
//! use linkpacket_core::SocketType;
//!
//! let ifi = interface_by_name("eth0")?;
//! let conn = Conn::listen(&ifi, SocketType::Raw, 0x0800, None)?;
//! let mut buf = vec![0u8; ifi.mtu as usize + 14];
//! let (n, from) = conn.read_from(&mut buf)?;
//! println!("{n} bytes from {from}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bsd;
pub mod codec;
pub mod conn;
pub mod iface;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod null;
pub mod traits;

#[cfg(target_os = "linux")]
pub mod linux;

use linkpacket_core::{Addr, Config, EtherType, Interface, Result, SocketType};

pub use conn::{Conn, RawConn};
pub use iface::{interface_by_name, interfaces};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockDriver, MockPeer};
pub use null::NullDriver;
pub use traits::{Driver, RawDescriptor};

#[cfg(target_os = "linux")]
pub use linux::LinuxDriver;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub use bsd::BsdDriver;

/// Open the host's driver for `ifi`
///
/// Returns the driver and the local hardware address it is bound to.
///
/// # Errors
/// Whatever the driver reports; [`linkpacket_core::Error::Unsupported`] on
/// hosts without a driver.
pub fn open(
    ifi: &Interface,
    kind: SocketType,
    protocol: EtherType,
    config: &Config,
) -> Result<(Box<dyn Driver>, Addr)> {
    #[cfg(target_os = "linux")]
    {
        let (driver, local) = LinuxDriver::open(ifi, kind, protocol, config)?;
        Ok((Box::new(driver), local))
    }

    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))]
    {
        let (driver, local) = BsdDriver::open(ifi, kind, protocol, config)?;
        Ok((Box::new(driver), local))
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    )))]
    {
        let (driver, local) = NullDriver::open(ifi, kind, protocol, config)?;
        Ok((Box::new(driver), local))
    }
}

/// Wrap an existing packet socket descriptor in a driver
///
/// # Errors
/// [`linkpacket_core::Error::Unsupported`] where descriptors cannot be
/// adopted, [`linkpacket_core::Error::InvalidArgument`] if `fd` is not a
/// packet socket.
#[cfg(unix)]
pub fn adopt(fd: std::os::fd::OwnedFd) -> Result<(Box<dyn Driver>, Addr)> {
    #[cfg(target_os = "linux")]
    {
        let (driver, local) = LinuxDriver::from_fd(fd)?;
        Ok((Box::new(driver), local))
    }

    #[cfg(not(target_os = "linux"))]
    {
        drop(fd);
        Err(linkpacket_core::Error::unsupported(
            linkpacket_core::Capability::FileConn,
        ))
    }
}
