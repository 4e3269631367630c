//! BPF device ioctl request numbers
//!
//! BSD kernels encode the argument size into each request, so the numbers
//! are computed from the structure sizes rather than hard-coded.

const IOCPARM_MASK: u32 = 0x1fff;
const IOC_VOID: u32 = 0x2000_0000;
const IOC_OUT: u32 = 0x4000_0000;
const IOC_IN: u32 = 0x8000_0000;

/// Size of the BSD `struct ifreq`
pub const IFREQ_LEN: usize = 32;

/// Size of a `u_int` argument
const UINT_LEN: usize = 4;

const fn ioc(inout: u32, group: u8, num: u8, len: usize) -> u64 {
    (inout | (((len as u32) & IOCPARM_MASK) << 16) | ((group as u32) << 8) | num as u32) as u64
}

/// Request without an argument
pub const fn io(group: u8, num: u8) -> u64 {
    ioc(IOC_VOID, group, num, 0)
}

/// Request that reads `len` bytes back from the kernel
pub const fn ior(group: u8, num: u8, len: usize) -> u64 {
    ioc(IOC_OUT, group, num, len)
}

/// Request that passes `len` bytes to the kernel
pub const fn iow(group: u8, num: u8, len: usize) -> u64 {
    ioc(IOC_IN, group, num, len)
}

/// Read the capture buffer size
pub const BIOCGBLEN: u64 = ior(b'B', 102, UINT_LEN);
/// Discard buffered frames
pub const BIOCFLUSH: u64 = io(b'B', 104);
/// Enter promiscuous mode
pub const BIOCPROMISC: u64 = io(b'B', 105);
/// Attach the device to an interface
pub const BIOCSETIF: u64 = iow(b'B', 108, IFREQ_LEN);
/// Return frames as soon as they arrive
pub const BIOCIMMEDIATE: u64 = iow(b'B', 112, UINT_LEN);
/// Leave the source address of written frames alone
pub const BIOCSHDRCMPLT: u64 = iow(b'B', 117, UINT_LEN);
/// Capture locally sent frames (Darwin, FreeBSD, DragonFly)
pub const BIOCSSEESENT: u64 = iow(b'B', 119, UINT_LEN);
/// Capture locally sent frames (NetBSD numbering)
pub const BIOCSSEESENT_NETBSD: u64 = iow(b'B', 121, UINT_LEN);
/// Drop frames travelling in the given direction (OpenBSD)
pub const BIOCSDIRFILT: u64 = iow(b'B', 125, UINT_LEN);

/// Install a filter program described by a `struct bpf_program` of `len` bytes
pub const fn biocsetf(len: usize) -> u64 {
    iow(b'B', 103, len)
}

/// Set the read timeout from a `struct timeval` of `len` bytes
pub const fn biocsrtimeout(len: usize) -> u64 {
    iow(b'B', 109, len)
}
