//! Reads bounded by a device read timeout
//!
//! A BPF `read(2)` cannot be interrupted by closing the descriptor. Each
//! attempt arms the device timeout with at most [`READ_SLICE`] and the time
//! left until the deadline, so both a passed deadline and a close are seen
//! within one slice.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use linkpacket_core::{Deadline, Error, Result};
use tracing::trace;

/// Longest single blocking read
pub const READ_SLICE: Duration = Duration::from_millis(200);

/// A device whose blocking read honours a settable timeout
pub trait TimedRead {
    /// Arm the timeout used by the next [`TimedRead::read`]
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// One blocking read; `Ok(0)` when the timeout passed with nothing buffered
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Read once data is available, the deadline passes or `closed` is set
///
/// # Errors
/// [`Error::Timeout`] at the deadline, [`Error::Closed`] once `closed` is
/// set, or the device error.
pub fn read_sliced<D: TimedRead + ?Sized>(
    device: &mut D,
    buf: &mut [u8],
    deadline: &Deadline,
    closed: &AtomicBool,
) -> Result<usize> {
    loop {
        if closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let slice = deadline.wait().bounded(READ_SLICE).ok_or(Error::Timeout)?;
        device.set_read_timeout(slice)?;
        match device.read(buf) {
            Ok(0) => trace!(?slice, "Read slice elapsed"),
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}
