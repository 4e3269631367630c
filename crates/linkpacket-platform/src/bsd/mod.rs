//! BSD `/dev/bpf` implementation
//!
//! The request numbering, dialect table, record parser, device scan and
//! sliced read loop are plain Rust and build everywhere; only the driver
//! touches the device.

pub mod device;
pub mod dialect;
pub mod header;
pub mod ioctl;
pub mod sliced;

pub use sliced::READ_SLICE;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod driver;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub use driver::BsdDriver;
