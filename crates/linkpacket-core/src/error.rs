//! Error types for linkpacket
//!
//! Drivers report [`Error`]; the connection wraps it exactly once into an
//! [`OpError`] that names the operation and the local address.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::addr::Addr;
use crate::config::{Direction, SocketType};

/// Network name reported in every [`OpError`]
pub const NETWORK: &str = "packet";

/// A capability that a driver may lack on the running platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Link-layer connections as a whole
    Driver,
    /// Kernel packet and drop counters
    Stats,
    /// Deadlines on writes
    WriteDeadline,
    /// A particular direction filter
    Direction(Direction),
    /// A particular socket type
    SocketType(SocketType),
    /// Replacing the filter program after the connection is configured
    FilterReplace,
    /// Leaving promiscuous mode
    PromiscuousOff,
    /// Readiness-driven raw descriptor reads and writes
    RawIo,
    /// Adopting an existing descriptor
    FileConn,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Driver => f.write_str("link-layer packet connections"),
            Capability::Stats => f.write_str("packet statistics"),
            Capability::WriteDeadline => f.write_str("write deadlines"),
            Capability::Direction(d) => write!(f, "direction filter {d}"),
            Capability::SocketType(t) => write!(f, "socket type {t}"),
            Capability::FilterReplace => f.write_str("filter replacement"),
            Capability::PromiscuousOff => f.write_str("disabling promiscuous mode"),
            Capability::RawIo => f.write_str("raw descriptor reads and writes"),
            Capability::FileConn => f.write_str("adopting a descriptor"),
        }
    }
}

/// Driver-level error
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: socket type, address, protocol, filter program
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong
        message: String,
    },

    /// Raw link-layer access usually needs elevated privilege
    #[error("permission denied: {0}")]
    PermissionDenied(#[source] io::Error),

    /// Every candidate capture device is taken
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The capability is absent on this platform
    #[error("{capability} not supported on {platform}")]
    Unsupported {
        /// Which capability is missing
        capability: Capability,
        /// Operating system the driver runs on
        platform: &'static str,
    },

    /// The connection was already closed
    #[error("use of closed connection")]
    Closed,

    /// A deadline elapsed before the operation completed
    #[error("i/o timeout")]
    Timeout,

    /// Any other operating system failure, passed through unchanged
    #[error("{0}")]
    Os(#[source] io::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an unsupported error for the running platform
    pub fn unsupported(capability: Capability) -> Self {
        Self::Unsupported {
            capability,
            platform: std::env::consts::OS,
        }
    }

    /// Capture the calling thread's last OS error
    pub fn last_os_error() -> Self {
        Self::from(io::Error::last_os_error())
    }

    /// Closest [`io::ErrorKind`] for this error
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Error::InvalidArgument { .. } => io::ErrorKind::InvalidInput,
            Error::PermissionDenied(_) => io::ErrorKind::PermissionDenied,
            Error::ResourceExhausted(_) => io::ErrorKind::AddrInUse,
            Error::Unsupported { .. } => io::ErrorKind::Unsupported,
            Error::Closed => io::ErrorKind::NotConnected,
            Error::Timeout => io::ErrorKind::TimedOut,
            Error::Os(e) => e.kind(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(err),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::Os(err),
        }
    }
}

/// Operation names carried by [`OpError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Connection establishment
    Listen,
    /// Frame receive
    Read,
    /// Frame transmit
    Write,
    /// Deadline, filter and mode changes
    Set,
    /// Connection teardown
    Close,
    /// Statistics query
    Stats,
    /// Raw connection retrieval
    SyscallConn,
    /// Raw descriptor control callback
    RawControl,
    /// Raw descriptor read callback
    RawRead,
    /// Raw descriptor write callback
    RawWrite,
}

impl Op {
    /// Stable operation name
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Listen => "listen",
            Op::Read => "read",
            Op::Write => "write",
            Op::Set => "set",
            Op::Close => "close",
            Op::Stats => "stats",
            Op::SyscallConn => "syscall-conn",
            Op::RawControl => "raw-control",
            Op::RawRead => "raw-read",
            Op::RawWrite => "raw-write",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by every connection operation
#[derive(Debug)]
pub struct OpError {
    /// Operation that failed
    pub op: Op,
    /// Always [`NETWORK`]
    pub net: &'static str,
    /// Local address of the connection, when known
    pub addr: Option<Addr>,
    /// Underlying driver error
    pub source: Error,
}

impl std::error::Error for OpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.net)?;
        if let Some(addr) = &self.addr {
            write!(f, " {addr}")?;
        }
        write!(f, ": {}", self.source)
    }
}

impl OpError {
    /// Closest [`io::ErrorKind`] for the underlying error
    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }

    /// Whether a deadline elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self.source, Error::Timeout)
    }

    /// Whether the connection was closed
    pub fn is_closed(&self) -> bool {
        matches!(self.source, Error::Closed)
    }

    /// Whether the platform lacks the capability
    pub fn is_unsupported(&self) -> bool {
        matches!(self.source, Error::Unsupported { .. })
    }

    /// Unwrap the driver error
    pub fn into_source(self) -> Error {
        self.source
    }
}

impl From<OpError> for io::Error {
    fn from(err: OpError) -> Self {
        io::Error::new(err.kind(), err)
    }
}

/// Wrap a driver error with the operation name and local address
pub fn op_error(op: Op, err: Error, local: Option<&Addr>) -> OpError {
    OpError {
        op,
        net: NETWORK,
        addr: local.copied(),
        source: err,
    }
}
