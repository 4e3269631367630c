//! Link-layer packet connection
//!
//! [`Conn`] owns one driver and reports every failure as an [`OpError`]
//! naming the operation and the connection's local address.

use std::fmt;
use std::time::Instant;

use linkpacket_core::filter::RawInstruction;
use linkpacket_core::{
    op_error, Addr, Config, Error, EtherType, Interface, Op, OpError, SocketType, Stats,
};
use tracing::debug;

use crate::traits::{Driver, RawDescriptor};

/// A packet connection bound to one interface and EtherType
pub struct Conn {
    driver: Box<dyn Driver>,
    local: Addr,
}

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Conn>();
};

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("local", &self.local)
            .field("closed", &self.driver.is_closed())
            .finish_non_exhaustive()
    }
}

impl Conn {
    /// Open a connection on `ifi` receiving frames of `protocol`
    ///
    /// `config` defaults to no filter and both directions.
    ///
    /// # Errors
    /// `InvalidArgument` for a protocol above 65535 or a malformed filter,
    /// plus any error the platform driver reports.
    pub fn listen(
        ifi: &Interface,
        kind: SocketType,
        protocol: u32,
        config: Option<&Config>,
    ) -> Result<Self, OpError> {
        let fail = |e: Error| op_error(Op::Listen, e, ifi.hardware_addr.as_ref());

        let protocol = EtherType::try_from(protocol).map_err(fail)?;
        let default = Config::default();
        let config = config.unwrap_or(&default);
        config.validate().map_err(fail)?;

        let (driver, local) = crate::open(ifi, kind, protocol, config).map_err(fail)?;
        debug!(interface = %ifi.name, local = %local, "Listening");
        Ok(Self { driver, local })
    }

    /// Wrap a duplicate of an existing packet socket
    ///
    /// The caller keeps its own descriptor.
    ///
    /// # Errors
    /// `Unsupported` off Linux, `InvalidArgument` if `fd` is not a packet
    /// socket.
    #[cfg(unix)]
    pub fn file_conn(fd: &impl std::os::fd::AsFd) -> Result<Self, OpError> {
        let fail = |e: Error| op_error(Op::Listen, e, None);
        let owned = fd
            .as_fd()
            .try_clone_to_owned()
            .map_err(|e| fail(e.into()))?;
        let (driver, local) = crate::adopt(owned).map_err(fail)?;
        Ok(Self { driver, local })
    }

    /// Wrap an already opened driver
    pub fn with_driver(driver: Box<dyn Driver>, local: Addr) -> Self {
        Self { driver, local }
    }

    fn wrap(&self, op: Op, err: Error) -> OpError {
        op_error(op, err, Some(&self.local))
    }

    /// Receive one frame, returning its length and the sender's address
    ///
    /// # Errors
    /// Timeout when the read deadline passes, Closed after [`Conn::close`].
    pub fn read_from(&self, buf: &mut [u8]) -> Result<(usize, Addr), OpError> {
        self.driver
            .read_from(buf)
            .map_err(|e| self.wrap(Op::Read, e))
    }

    /// Transmit one frame to `dst`
    ///
    /// # Errors
    /// `InvalidArgument` for an empty destination, Timeout when the write
    /// deadline passes.
    pub fn write_to(&self, frame: &[u8], dst: &Addr) -> Result<usize, OpError> {
        self.driver
            .write_to(frame, dst)
            .map_err(|e| self.wrap(Op::Write, e))
    }

    /// Hardware address the connection is bound to
    pub fn local_addr(&self) -> &Addr {
        &self.local
    }

    /// Set or clear the read deadline
    ///
    /// # Errors
    /// Closed after [`Conn::close`].
    pub fn set_read_deadline(&self, at: Option<Instant>) -> Result<(), OpError> {
        self.driver
            .set_read_deadline(at)
            .map_err(|e| self.wrap(Op::Set, e))
    }

    /// Set or clear the write deadline
    ///
    /// # Errors
    /// Closed after [`Conn::close`]; Unsupported on BPF devices.
    pub fn set_write_deadline(&self, at: Option<Instant>) -> Result<(), OpError> {
        self.driver
            .set_write_deadline(at)
            .map_err(|e| self.wrap(Op::Set, e))
    }

    /// Set or clear both deadlines
    ///
    /// The read deadline is applied first and stays applied if the write
    /// deadline is rejected.
    ///
    /// # Errors
    /// As [`Conn::set_read_deadline`] and [`Conn::set_write_deadline`].
    pub fn set_deadline(&self, at: Option<Instant>) -> Result<(), OpError> {
        self.driver
            .set_deadline(at)
            .map_err(|e| self.wrap(Op::Set, e))
    }

    /// Release the descriptor, unblocking pending reads
    ///
    /// # Errors
    /// Closed on a second call.
    pub fn close(&self) -> Result<(), OpError> {
        self.driver.close().map_err(|e| self.wrap(Op::Close, e))
    }

    /// Kernel packet counters since the previous call
    ///
    /// # Errors
    /// Unsupported where the kernel keeps no counters.
    pub fn stats(&self) -> Result<Stats, OpError> {
        self.driver.stats().map_err(|e| self.wrap(Op::Stats, e))
    }

    /// Enter or leave promiscuous mode
    ///
    /// # Errors
    /// Unsupported when leaving promiscuous mode on a BPF device.
    pub fn set_promiscuous(&self, enable: bool) -> Result<(), OpError> {
        self.driver
            .set_promiscuous(enable)
            .map_err(|e| self.wrap(Op::Set, e))
    }

    /// Replace the kernel filter program
    ///
    /// # Errors
    /// `InvalidArgument` for a malformed program, Unsupported on BPF devices.
    pub fn set_bpf(&self, program: &[RawInstruction]) -> Result<(), OpError> {
        self.driver
            .set_bpf(program)
            .map_err(|e| self.wrap(Op::Set, e))
    }

    /// Access to the underlying descriptor
    ///
    /// # Errors
    /// Closed after [`Conn::close`].
    pub fn syscall_conn(&self) -> Result<RawConn<'_>, OpError> {
        if self.driver.is_closed() {
            return Err(self.wrap(Op::SyscallConn, Error::Closed));
        }
        Ok(RawConn { conn: self })
    }
}

/// Descriptor-level access borrowed from a [`Conn`]
#[derive(Debug, Clone, Copy)]
pub struct RawConn<'a> {
    conn: &'a Conn,
}

impl RawConn<'_> {
    /// Run `f` with the descriptor, which stays open until `f` returns
    ///
    /// `f` may close the connection; the descriptor is released once `f`
    /// is done with it.
    ///
    /// # Errors
    /// Closed after [`Conn::close`].
    pub fn control<F>(&self, f: F) -> Result<(), OpError>
    where
        F: FnOnce(RawDescriptor),
    {
        let mut f = Some(f);
        self.conn
            .driver
            .raw_control(&mut |fd| {
                if let Some(f) = f.take() {
                    f(fd);
                }
            })
            .map_err(|e| self.conn.wrap(Op::RawControl, e))
    }

    /// Call `f` until it returns `true`, waiting for readability in between
    ///
    /// # Errors
    /// Timeout at the read deadline; Unsupported on BPF devices.
    pub fn read<F>(&self, mut f: F) -> Result<(), OpError>
    where
        F: FnMut(RawDescriptor) -> bool,
    {
        self.conn
            .driver
            .raw_read(&mut f)
            .map_err(|e| self.conn.wrap(Op::RawRead, e))
    }

    /// Call `f` until it returns `true`, waiting for writability in between
    ///
    /// # Errors
    /// Timeout at the write deadline; Unsupported on BPF devices.
    pub fn write<F>(&self, mut f: F) -> Result<(), OpError>
    where
        F: FnMut(RawDescriptor) -> bool,
    {
        self.conn
            .driver
            .raw_write(&mut f)
            .map_err(|e| self.conn.wrap(Op::RawWrite, e))
    }
}
