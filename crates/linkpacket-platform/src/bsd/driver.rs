//! BPF capture device driver
//!
//! A blocked `read(2)` on a BPF device is not interrupted when the
//! descriptor is closed, so reads go through [`read_sliced`], checking the
//! closed flag and the deadline between slices. The descriptor itself is
//! released once the last in-flight operation drops its reference.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use linkpacket_core::filter::{self, FilterBuilder, RawInstruction};
use linkpacket_core::{
    Addr, Capability, Config, Deadline, Error, EtherType, Interface, Result, SocketType,
};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use super::device::{self, DEVICE_COUNT};
use super::dialect::Dialect;
use super::header;
use super::ioctl;
use super::sliced::{read_sliced, TimedRead};
use crate::traits::{Driver, RawDescriptor};

/// Interface name capacity, including the terminating NUL
const IFNAMSIZ: usize = 16;

/// Kernel `struct bpf_insn`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct BpfInsn {
    code: u16,
    jt: u8,
    jf: u8,
    k: u32,
}

/// Kernel `struct bpf_program`
#[repr(C)]
struct BpfProgram {
    bf_len: libc::c_uint,
    bf_insns: *mut BpfInsn,
}

/// Kernel `struct ifreq`, only the name is used
#[repr(C)]
struct IfReq {
    name: [u8; IFNAMSIZ],
    data: [u8; ioctl::IFREQ_LEN - IFNAMSIZ],
}

const _: () = assert!(std::mem::size_of::<BpfInsn>() == 8);
const _: () = assert!(std::mem::size_of::<IfReq>() == ioctl::IFREQ_LEN);

fn to_bpf_insns(program: &[RawInstruction]) -> Vec<BpfInsn> {
    program
        .iter()
        .map(|ins| BpfInsn {
            code: ins.op,
            jt: ins.jt,
            jf: ins.jf,
            k: ins.k,
        })
        .collect()
}

fn ioctl_ptr<T>(fd: RawFd, request: u64, arg: *mut T) -> io::Result<()> {
    // SAFETY: request encodes size_of::<T>() and arg points to a live T
    let rc = unsafe { libc::ioctl(fd, request as _, arg) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn ioctl_void(fd: RawFd, request: u64) -> io::Result<()> {
    // SAFETY: request takes no argument
    let rc = unsafe { libc::ioctl(fd, request as _) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn ioctl_set_uint(fd: RawFd, request: u64, value: u32) -> io::Result<()> {
    let mut value: libc::c_uint = value;
    ioctl_ptr(fd, request, &mut value)
}

fn timeval(d: Duration) -> libc::timeval {
    // A zero timeout means "block forever" to the device.
    let d = d.max(Duration::from_micros(1));
    libc::timeval {
        tv_sec: d.as_secs() as libc::time_t,
        tv_usec: d.subsec_micros() as libc::suseconds_t,
    }
}

/// An open device seen through `BIOCSRTIMEOUT` and `read(2)`
struct Device<'a> {
    file: &'a File,
    timeout_request: u64,
}

impl TimedRead for Device<'_> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let mut tv = timeval(timeout);
        ioctl_ptr(self.file.as_raw_fd(), self.timeout_request, &mut tv)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.file, buf)
    }
}

/// BSD capture device
#[derive(Debug)]
pub struct BsdDriver {
    device: RwLock<Option<Arc<File>>>,
    closed: AtomicBool,
    read_deadline: Deadline,
    buflen: usize,
    header_len: usize,
    ifname: String,
    protocol: EtherType,
}

impl BsdDriver {
    /// Acquire a device and attach it to `ifi`
    ///
    /// # Errors
    /// [`Error::Unsupported`] for datagram sockets or [`linkpacket_core::Direction::Out`]
    /// where the device cannot express it, [`Error::ResourceExhausted`] when
    /// every device is busy, [`Error::InvalidArgument`] for a malformed filter
    /// or interface name.
    pub fn open(
        ifi: &Interface,
        kind: SocketType,
        protocol: EtherType,
        config: &Config,
    ) -> Result<(Self, Addr)> {
        if kind != SocketType::Raw {
            return Err(Error::unsupported(Capability::SocketType(kind)));
        }

        let dialect = Dialect::host();
        let direction = dialect.direction_request(config.direction).map_err(|e| {
            warn!(direction = %config.direction, "Direction filter not available on this device");
            e
        })?;

        let mut builder = FilterBuilder::new(protocol).mtu(ifi.mtu);
        if !config.filter.is_empty() {
            filter::validate(&config.filter)?;
            builder = builder.append(&config.filter);
        }
        let program = builder.build()?;

        let mut ifreq = IfReq {
            name: [0; IFNAMSIZ],
            data: [0; ioctl::IFREQ_LEN - IFNAMSIZ],
        };
        let name = ifi.name.as_bytes();
        if name.is_empty() || name.len() >= IFNAMSIZ {
            return Err(Error::invalid_argument(format!(
                "interface name {:?} does not fit IFNAMSIZ",
                ifi.name
            )));
        }
        ifreq.name[..name.len()].copy_from_slice(name);

        info!(
            interface = %ifi.name,
            protocol = %protocol,
            dialect = ?dialect,
            "Opening capture device"
        );
        let (file, path) = device::scan(DEVICE_COUNT, |path| {
            OpenOptions::new().read(true).write(true).open(path)
        })?;
        let fd = file.as_raw_fd();

        ioctl_ptr(fd, ioctl::BIOCSETIF, &mut ifreq)?;
        ioctl_set_uint(fd, ioctl::BIOCIMMEDIATE, 1)?;

        let mut buflen: libc::c_uint = 0;
        ioctl_ptr(fd, ioctl::BIOCGBLEN, &mut buflen)?;

        ioctl_set_uint(fd, ioctl::BIOCSHDRCMPLT, 1)?;
        ioctl_set_uint(fd, direction.request, direction.value)?;

        let mut insns = to_bpf_insns(&program);
        let mut prog = BpfProgram {
            // program length is bounded by MAX_INSTRUCTIONS
            bf_len: insns.len() as libc::c_uint,
            bf_insns: insns.as_mut_ptr(),
        };
        ioctl_ptr(
            fd,
            ioctl::biocsetf(std::mem::size_of::<BpfProgram>()),
            &mut prog,
        )?;
        ioctl_void(fd, ioctl::BIOCFLUSH)?;

        debug!(
            path = %path.display(),
            buflen,
            instructions = program.len(),
            "Configured capture device"
        );

        let local = match ifi.hardware_addr {
            Some(addr) => addr,
            None => Addr::from_valid_prefix(&[], 0)?,
        };

        let driver = Self {
            device: RwLock::new(Some(Arc::new(file))),
            closed: AtomicBool::new(false),
            read_deadline: Deadline::new(),
            buflen: buflen as usize,
            header_len: dialect.header_len(),
            ifname: ifi.name.clone(),
            protocol,
        };
        Ok((driver, local))
    }

    fn live(&self) -> Result<Arc<File>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.device.read().as_ref().map(Arc::clone).ok_or(Error::Closed)
    }
}

impl Driver for BsdDriver {
    fn read_from(&self, buf: &mut [u8]) -> Result<(usize, Addr)> {
        let file = self.live()?;
        let mut device = Device {
            file: &file,
            timeout_request: ioctl::biocsrtimeout(std::mem::size_of::<libc::timeval>()),
        };

        let mut raw = vec![0u8; self.buflen];
        let n = read_sliced(&mut device, &mut raw, &self.read_deadline, &self.closed)?;

        let record = header::parse(&raw[..n], self.header_len)?;
        if record.frame.len() > buf.len() {
            warn!(
                frame = record.frame.len(),
                buffer = buf.len(),
                "Frame truncated to read buffer"
            );
        }
        let copied = record.frame.len().min(buf.len());
        buf[..copied].copy_from_slice(&record.frame[..copied]);
        trace!(len = copied, from = %record.source, "Received frame");
        Ok((copied, record.source))
    }

    fn write_to(&self, frame: &[u8], _dst: &Addr) -> Result<usize> {
        let file = self.live()?;
        let n = (&*file).write(frame)?;
        trace!(len = n, "Sent frame");
        Ok(n)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::Closed);
        }
        // An in-flight read slice keeps the device open until it returns.
        let file = self.device.write().take().ok_or(Error::Closed)?;
        let in_flight = Arc::strong_count(&file) - 1;
        drop(file);
        info!(
            interface = %self.ifname,
            protocol = %self.protocol,
            in_flight,
            "Closed capture device"
        );
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn set_read_deadline(&self, at: Option<Instant>) -> Result<()> {
        let _live = self.live()?;
        self.read_deadline.set(at);
        Ok(())
    }

    fn set_write_deadline(&self, _at: Option<Instant>) -> Result<()> {
        let _live = self.live()?;
        Err(Error::unsupported(Capability::WriteDeadline))
    }

    fn set_promiscuous(&self, enable: bool) -> Result<()> {
        let file = self.live()?;
        if !enable {
            return Err(Error::unsupported(Capability::PromiscuousOff));
        }
        ioctl_void(file.as_raw_fd(), ioctl::BIOCPROMISC)?;
        debug!(interface = %self.ifname, "Enabled promiscuous mode");
        Ok(())
    }

    fn raw_control(&self, f: &mut dyn FnMut(RawDescriptor)) -> Result<()> {
        let file = self.live()?;
        f(file.as_raw_fd());
        Ok(())
    }
}
