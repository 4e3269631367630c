//! Platform-agnostic driver interface
//!
//! Every kernel mechanism implements [`Driver`]. Errors are reported as plain
//! [`linkpacket_core::Error`] values; the connection adds the operation name
//! and local address.

use std::os::raw::c_int;
use std::time::Instant;

use linkpacket_core::filter::RawInstruction;
use linkpacket_core::{Addr, Capability, Error, Result, Stats};

/// Kernel descriptor handed to raw callbacks
pub type RawDescriptor = c_int;

/// Link-layer capture and injection
///
/// Implementations are shared between threads: a read may block on one
/// thread while another writes, changes deadlines, or closes.
pub trait Driver: Send + Sync {
    /// Receive one frame into `buf`, returning its length and source address
    ///
    /// Blocks until a frame arrives, the read deadline passes
    /// ([`Error::Timeout`]) or the driver is closed ([`Error::Closed`]).
    fn read_from(&self, buf: &mut [u8]) -> Result<(usize, Addr)>;

    /// Transmit one frame to `dst`
    fn write_to(&self, frame: &[u8], dst: &Addr) -> Result<usize>;

    /// Release the descriptor; later calls fail with [`Error::Closed`]
    fn close(&self) -> Result<()>;

    /// Whether [`Driver::close`] has been called
    fn is_closed(&self) -> bool;

    /// Set or clear the read deadline
    fn set_read_deadline(&self, at: Option<Instant>) -> Result<()>;

    /// Set or clear the write deadline
    fn set_write_deadline(&self, at: Option<Instant>) -> Result<()>;

    /// Set both deadlines, read first
    fn set_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.set_read_deadline(at)?;
        self.set_write_deadline(at)
    }

    /// Enter or leave promiscuous mode
    fn set_promiscuous(&self, enable: bool) -> Result<()>;

    /// Replace the filter program
    fn set_bpf(&self, _program: &[RawInstruction]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Err(Error::unsupported(Capability::FilterReplace))
    }

    /// Kernel packet counters
    fn stats(&self) -> Result<Stats> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Err(Error::unsupported(Capability::Stats))
    }

    /// Run `f` with the descriptor; the descriptor stays open until it returns
    ///
    /// Implementations must not hold a lock across `f`, which may call
    /// [`Driver::close`].
    fn raw_control(&self, f: &mut dyn FnMut(RawDescriptor)) -> Result<()>;

    /// Call `f` until it returns `true`, waiting for readability in between
    fn raw_read(&self, _f: &mut dyn FnMut(RawDescriptor) -> bool) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Err(Error::unsupported(Capability::RawIo))
    }

    /// Call `f` until it returns `true`, waiting for writability in between
    fn raw_write(&self, _f: &mut dyn FnMut(RawDescriptor) -> bool) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Err(Error::unsupported(Capability::RawIo))
    }
}
