//! Packet socket plumbing `socket2` does not cover
//!
//! Addresses cross into `socket2` as [`SockAddr`] values built from
//! [`RawSockaddrLinklayer`]; the packet-level options and the wake
//! descriptor go straight to `libc`.

use std::io;
use std::mem::{self, MaybeUninit};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::slice;

use linkpacket_core::filter::RawInstruction;
use socket2::{SockAddr, Socket};

use crate::codec::{RawSockaddrLinklayer, ENCODED_LEN, SOCKADDR_LL_LEN};

/// Skip frames the host itself transmitted
pub(crate) const PACKET_IGNORE_OUTGOING: libc::c_int = 23;

/// Read and reset the socket packet counters
pub(crate) const PACKET_STATISTICS: libc::c_int = 6;

/// `struct tpacket_stats_v3`; older sockets fill only the first two fields
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TpacketStatsV3 {
    pub tp_packets: u32,
    pub tp_drops: u32,
    pub tp_freeze_q_cnt: u32,
}

const _: () = assert!(mem::size_of::<libc::sockaddr_storage>() >= ENCODED_LEN);
const _: () = assert!(mem::size_of::<libc::sockaddr_ll>() == SOCKADDR_LL_LEN);
const _: () = assert!(mem::size_of::<libc::sock_filter>() == 8);

fn cvt(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

/// Copy a program into the kernel instruction layout
pub(crate) fn to_sock_filter(program: &[RawInstruction]) -> Vec<libc::sock_filter> {
    program
        .iter()
        .map(|ins| libc::sock_filter {
            code: ins.op,
            jt: ins.jt,
            jf: ins.jf,
            k: ins.k,
        })
        .collect()
}

/// Install `program` with `SO_ATTACH_FILTER`, replacing any previous one
pub(crate) fn attach_filter(socket: &Socket, program: &[RawInstruction]) -> io::Result<()> {
    if u16::try_from(program.len()).is_err() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "filter program too long",
        ));
    }
    socket.attach_filter(&to_sock_filter(program))
}

pub(crate) fn setsockopt<T>(
    fd: RawFd,
    level: libc::c_int,
    name: libc::c_int,
    value: &T,
) -> io::Result<()> {
    // SAFETY: value points to a live T and the length passed is its size
    cvt(unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            (value as *const T).cast::<libc::c_void>(),
            mem::size_of::<T>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

pub(crate) fn packet_stats(fd: RawFd) -> io::Result<TpacketStatsV3> {
    let mut stats = TpacketStatsV3::default();
    let mut len = mem::size_of::<TpacketStatsV3>() as libc::socklen_t;
    // SAFETY: stats is writable for len bytes and the kernel writes at most len
    cvt(unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_PACKET,
            PACKET_STATISTICS,
            ptr::addr_of_mut!(stats).cast::<libc::c_void>(),
            &mut len,
        )
    })?;
    Ok(stats)
}

/// Wrap a link-layer address for `socket2`
pub(crate) fn sock_addr(raw: &RawSockaddrLinklayer) -> SockAddr {
    let bytes = raw.to_bytes();
    // SAFETY: sockaddr_storage is plain data, all-zero is a valid value
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    // SAFETY: storage is larger than ENCODED_LEN (asserted above) and the
    // regions cannot overlap
    unsafe {
        ptr::copy_nonoverlapping(
            bytes.as_ptr(),
            ptr::addr_of_mut!(storage).cast::<u8>(),
            bytes.len(),
        );
    }
    // SAFETY: storage holds an AF_PACKET address of socklen() valid bytes
    unsafe { SockAddr::new(storage, raw.socklen() as libc::socklen_t) }
}

/// Decode the link-layer address the kernel reported
pub(crate) fn link_addr(addr: &SockAddr) -> io::Result<RawSockaddrLinklayer> {
    let len = (addr.len() as usize).min(mem::size_of::<libc::sockaddr_storage>());
    // SAFETY: SockAddr owns a sockaddr_storage and len is clamped to its size
    let bytes = unsafe { slice::from_raw_parts(addr.as_ptr().cast::<u8>(), len) };
    RawSockaddrLinklayer::decode(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// `recvfrom(2)` into an initialized buffer
pub(crate) fn recv_from(
    socket: &Socket,
    buf: &mut [u8],
) -> io::Result<(usize, RawSockaddrLinklayer)> {
    // SAFETY: MaybeUninit<u8> has the layout of u8 and recv_from only
    // writes initialized bytes
    let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
    let (n, from) = socket.recv_from(uninit)?;
    Ok((n, link_addr(&from)?))
}

/// What woke a [`poll`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// The socket has the requested events (or an error) pending
    Descriptor,
    /// The wake descriptor was signalled
    Woken,
    /// Timeout or signal; recompute and retry
    Elapsed,
}

pub(crate) fn poll(
    fd: RawFd,
    events: libc::c_short,
    wake: RawFd,
    timeout_ms: libc::c_int,
) -> io::Result<Readiness> {
    let mut fds = [
        libc::pollfd {
            fd,
            events,
            revents: 0,
        },
        libc::pollfd {
            fd: wake,
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    // SAFETY: fds is a valid array of two pollfd entries
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(Readiness::Elapsed);
        }
        return Err(err);
    }
    if fds[1].revents != 0 {
        return Ok(Readiness::Woken);
    }
    if fds[0].revents != 0 {
        return Ok(Readiness::Descriptor);
    }
    Ok(Readiness::Elapsed)
}

/// An `eventfd` used to interrupt blocked readers
#[derive(Debug)]
pub(crate) struct EventFd(OwnedFd);

impl EventFd {
    pub(crate) fn new() -> io::Result<Self> {
        // SAFETY: eventfd has no memory preconditions
        let fd = cvt(unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) })?;
        // SAFETY: fd was just created and is owned by nothing else
        Ok(Self(unsafe { OwnedFd::from_raw_fd(fd) }))
    }

    /// Make the descriptor readable, permanently
    pub(crate) fn signal(&self) -> io::Result<()> {
        let one: u64 = 1;
        // SAFETY: writes eight bytes from a live u64
        let rc = unsafe {
            libc::write(
                self.0.as_raw_fd(),
                ptr::addr_of!(one).cast::<libc::c_void>(),
                mem::size_of::<u64>(),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl AsRawFd for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}
