//! `AF_PACKET` socket driver
//!
//! The socket is non-blocking; reads and writes wait in `poll(2)` on the
//! socket together with an `eventfd` that [`Driver::close`] signals, so a
//! close from another thread interrupts a blocked read at once.
//!
//! Operations hold their own reference to the socket rather than a lock, so
//! the descriptor is released when the last in-flight operation finishes.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use linkpacket_core::filter::{self, RawInstruction};
use linkpacket_core::{
    Addr, Capability, Config, Deadline, Direction, Error, EtherType, Interface, Result,
    SocketType, Stats, Wait,
};
use parking_lot::RwLock;
use socket2::{Domain, Socket, Type};
use tracing::{debug, info, trace, warn};

use super::sys::{self, EventFd, Readiness};
use crate::codec::{RawSockaddrLinklayer, AF_PACKET};
use crate::traits::{Driver, RawDescriptor};

/// Longest single `poll(2)`; deadline changes are picked up at this rate
const POLL_SLICE: Duration = Duration::from_millis(200);

/// Linux link-layer socket
#[derive(Debug)]
pub struct LinuxDriver {
    socket: RwLock<Option<Arc<Socket>>>,
    wake: EventFd,
    closed: AtomicBool,
    read_deadline: Deadline,
    write_deadline: Deadline,
    ifindex: i32,
    protocol: EtherType,
    kind: SocketType,
}

impl LinuxDriver {
    /// Open a socket bound to `ifi` and `protocol`
    ///
    /// The direction option and filter are applied before binding so no
    /// unfiltered frame is ever queued.
    ///
    /// # Errors
    /// [`Error::PermissionDenied`] without `CAP_NET_RAW`,
    /// [`Error::Unsupported`] for [`Direction::Out`],
    /// [`Error::InvalidArgument`] for a malformed filter or interface index.
    pub fn open(
        ifi: &Interface,
        kind: SocketType,
        protocol: EtherType,
        config: &Config,
    ) -> Result<(Self, Addr)> {
        info!(
            interface = %ifi.name,
            index = ifi.index,
            protocol = %protocol,
            kind = %kind,
            "Opening packet socket"
        );

        let ifindex = i32::try_from(ifi.index).map_err(|_| {
            Error::invalid_argument(format!("interface index {} out of range", ifi.index))
        })?;

        let ty = match kind {
            SocketType::Raw => Type::RAW,
            SocketType::Datagram => Type::DGRAM,
        };
        let socket = Socket::new(Domain::PACKET, ty, None)?;
        socket.set_nonblocking(true)?;

        match config.direction {
            Direction::InOut => {}
            Direction::In => {
                let on: libc::c_int = 1;
                sys::setsockopt(
                    socket.as_raw_fd(),
                    libc::SOL_PACKET,
                    sys::PACKET_IGNORE_OUTGOING,
                    &on,
                )?;
                debug!("Ignoring outgoing frames");
            }
            Direction::Out => {
                warn!(
                    direction = %config.direction,
                    "Direction filter not available on packet sockets"
                );
                return Err(Error::unsupported(Capability::Direction(Direction::Out)));
            }
        }

        if !config.filter.is_empty() {
            filter::validate(&config.filter)?;
            sys::attach_filter(&socket, &config.filter)?;
            debug!(instructions = config.filter.len(), "Attached filter");
        }

        socket.bind(&sys::sock_addr(&RawSockaddrLinklayer::bind(ifindex, protocol)))?;
        let local = sys::link_addr(&socket.local_addr()?)?.hardware_addr()?;
        debug!(local = %local, "Bound packet socket");

        let driver = Self::with_socket(socket, ifindex, protocol, kind)?;
        Ok((driver, local))
    }

    /// Adopt an already bound packet socket
    ///
    /// Interface, protocol and local address are read back from the kernel.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `fd` is not a raw or datagram packet
    /// socket.
    pub fn from_fd(fd: OwnedFd) -> Result<(Self, Addr)> {
        let socket = Socket::from(fd);
        let ty = socket.r#type()?;
        let kind = if ty == Type::RAW {
            SocketType::Raw
        } else if ty == Type::DGRAM {
            SocketType::Datagram
        } else {
            return Err(Error::invalid_argument(format!(
                "descriptor has unsupported socket type {ty:?}"
            )));
        };

        let bound = socket.local_addr()?;
        if bound.family() != AF_PACKET {
            return Err(Error::invalid_argument(format!(
                "descriptor has address family {}, not a packet socket",
                bound.family()
            )));
        }
        let name = sys::link_addr(&bound)?;
        socket.set_nonblocking(true)?;
        let local = name.hardware_addr()?;

        info!(
            index = name.ifindex,
            protocol = %name.ether_type(),
            kind = %kind,
            "Adopted packet socket"
        );

        let driver = Self::with_socket(socket, name.ifindex, name.ether_type(), kind)?;
        Ok((driver, local))
    }

    fn with_socket(
        socket: Socket,
        ifindex: i32,
        protocol: EtherType,
        kind: SocketType,
    ) -> Result<Self> {
        Ok(Self {
            socket: RwLock::new(Some(Arc::new(socket))),
            wake: EventFd::new()?,
            closed: AtomicBool::new(false),
            read_deadline: Deadline::new(),
            write_deadline: Deadline::new(),
            ifindex,
            protocol,
            kind,
        })
    }

    /// Socket type the driver was opened with
    pub fn kind(&self) -> SocketType {
        self.kind
    }

    fn live(&self) -> Result<Arc<Socket>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.socket.read().as_ref().map(Arc::clone).ok_or(Error::Closed)
    }

    /// Wait until `fd` has `events`, the deadline passes, or close is called
    fn wait(&self, fd: RawFd, events: libc::c_short, deadline: &Deadline) -> Result<()> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }
            let slice = deadline.wait().bounded(POLL_SLICE).ok_or(Error::Timeout)?;
            let timeout = Wait::For(slice).poll_millis();
            match sys::poll(fd, events, self.wake.as_raw_fd(), timeout)? {
                Readiness::Descriptor => return Ok(()),
                Readiness::Woken | Readiness::Elapsed => {}
            }
        }
    }
}

fn would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

impl Driver for LinuxDriver {
    fn read_from(&self, buf: &mut [u8]) -> Result<(usize, Addr)> {
        let socket = self.live()?;
        // An expired deadline fails even when a frame is queued.
        if self.read_deadline.wait() == Wait::Expired {
            return Err(Error::Timeout);
        }
        loop {
            match sys::recv_from(&socket, buf) {
                Ok((n, from)) => {
                    let addr = from.hardware_addr()?;
                    trace!(len = n, from = %addr, "Received frame");
                    return Ok((n, addr));
                }
                Err(e) if would_block(&e) => {
                    self.wait(socket.as_raw_fd(), libc::POLLIN, &self.read_deadline)?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_to(&self, frame: &[u8], dst: &Addr) -> Result<usize> {
        let socket = self.live()?;
        let raw = RawSockaddrLinklayer::encode(dst, self.ifindex, self.protocol)?;
        let to = sys::sock_addr(&raw);
        if self.write_deadline.wait() == Wait::Expired {
            return Err(Error::Timeout);
        }
        loop {
            match socket.send_to(frame, &to) {
                Ok(n) => {
                    trace!(len = n, to = %dst, "Sent frame");
                    return Ok(n);
                }
                Err(e) if would_block(&e) => {
                    self.wait(socket.as_raw_fd(), libc::POLLOUT, &self.write_deadline)?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::Closed);
        }
        if let Err(e) = self.wake.signal() {
            warn!(error = %e, "Failed to wake blocked readers");
        }

        let socket = self.socket.write().take().ok_or(Error::Closed)?;
        let in_flight = Arc::strong_count(&socket) - 1;
        drop(socket);
        info!(
            index = self.ifindex,
            protocol = %self.protocol,
            in_flight,
            "Closed packet socket"
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

    fn set_write_deadline(&self, at: Option<Instant>) -> Result<()> {
        let _live = self.live()?;
        self.write_deadline.set(at);
        Ok(())
    }

    fn set_promiscuous(&self, enable: bool) -> Result<()> {
        let socket = self.live()?;
        let mreq = libc::packet_mreq {
            mr_ifindex: self.ifindex,
            mr_type: libc::PACKET_MR_PROMISC as libc::c_ushort,
            mr_alen: 0,
            mr_address: [0; 8],
        };
        let name = if enable {
            libc::PACKET_ADD_MEMBERSHIP
        } else {
            libc::PACKET_DROP_MEMBERSHIP
        };
        sys::setsockopt(socket.as_raw_fd(), libc::SOL_PACKET, name, &mreq)?;
        debug!(index = self.ifindex, enable, "Changed promiscuous mode");
        Ok(())
    }

    fn set_bpf(&self, program: &[RawInstruction]) -> Result<()> {
        filter::validate(program)?;
        let socket = self.live()?;
        sys::attach_filter(&socket, program)?;
        debug!(instructions = program.len(), "Replaced filter");
        Ok(())
    }

    fn stats(&self) -> Result<Stats> {
        let socket = self.live()?;
        let raw = sys::packet_stats(socket.as_raw_fd())?;
        Ok(Stats {
            packets: raw.tp_packets,
            drops: raw.tp_drops,
            freeze_queue_count: raw.tp_freeze_q_cnt,
        })
    }

    fn raw_control(&self, f: &mut dyn FnMut(RawDescriptor)) -> Result<()> {
        let socket = self.live()?;
        f(socket.as_raw_fd());
        Ok(())
    }

    fn raw_read(&self, f: &mut dyn FnMut(RawDescriptor) -> bool) -> Result<()> {
        let socket = self.live()?;
        let fd = socket.as_raw_fd();
        while !f(fd) {
            self.wait(fd, libc::POLLIN, &self.read_deadline)?;
        }
        Ok(())
    }

    fn raw_write(&self, f: &mut dyn FnMut(RawDescriptor) -> bool) -> Result<()> {
        let socket = self.live()?;
        let fd = socket.as_raw_fd();
        while !f(fd) {
            self.wait(fd, libc::POLLOUT, &self.write_deadline)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A UDP socket exercises the locking and wake paths without CAP_NET_RAW.
    fn udp_driver() -> LinuxDriver {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None).unwrap();
        socket.set_nonblocking(true).unwrap();
        LinuxDriver::with_socket(socket, 1, EtherType::IPV4, SocketType::Datagram).unwrap()
    }

    #[test]
    fn test_close_inside_control() {
        let driver = udp_driver();
        let mut inner = None;
        driver
            .raw_control(&mut |fd| {
                assert!(fd >= 0);
                inner = Some(driver.close());
            })
            .unwrap();
        assert!(inner.unwrap().is_ok());
        assert!(driver.is_closed());
        assert!(matches!(driver.raw_control(&mut |_| {}), Err(Error::Closed)));
    }

    #[test]
    fn test_close_wakes_blocked_read() {
        let driver = Arc::new(udp_driver());
        let reader = {
            let driver = Arc::clone(&driver);
            std::thread::spawn(move || {
                let mut buf = [0u8; 64];
                driver.read_from(&mut buf)
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        driver.close().unwrap();
        let result = reader.join().unwrap();
        assert!(matches!(result, Err(Error::Closed)));
        assert!(start.elapsed() < POLL_SLICE);
    }

    #[test]
    fn test_write_after_close_reports_closed() {
        let driver = udp_driver();
        driver.close().unwrap();
        let empty = Addr::from_valid_prefix(&[], 0).unwrap();
        assert!(matches!(driver.write_to(&[0u8; 14], &empty), Err(Error::Closed)));
    }

    #[test]
    fn test_expired_read_deadline() {
        let driver = udp_driver();
        driver
            .set_read_deadline(Some(Instant::now() - Duration::from_millis(1)))
            .unwrap();
        let mut buf = [0u8; 64];
        assert!(matches!(driver.read_from(&mut buf), Err(Error::Timeout)));
    }
}
