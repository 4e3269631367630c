//! Driver for platforms without link-layer access

use std::time::Instant;

use linkpacket_core::filter::RawInstruction;
use linkpacket_core::{
    Addr, Capability, Config, Error, EtherType, Interface, Result, SocketType, Stats,
};

use crate::traits::{Driver, RawDescriptor};

fn unsupported<T>() -> Result<T> {
    Err(Error::unsupported(Capability::Driver))
}

/// Every operation reports [`Capability::Driver`] as unsupported
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDriver;

impl NullDriver {
    /// Always fails
    ///
    /// # Errors
    /// [`Error::Unsupported`] unconditionally.
    pub fn open(
        _ifi: &Interface,
        _kind: SocketType,
        _protocol: EtherType,
        _config: &Config,
    ) -> Result<(Self, Addr)> {
        unsupported()
    }
}

impl Driver for NullDriver {
    fn read_from(&self, _buf: &mut [u8]) -> Result<(usize, Addr)> {
        unsupported()
    }

    fn write_to(&self, _frame: &[u8], _dst: &Addr) -> Result<usize> {
        unsupported()
    }

    fn close(&self) -> Result<()> {
        unsupported()
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn set_read_deadline(&self, _at: Option<Instant>) -> Result<()> {
        unsupported()
    }

    fn set_write_deadline(&self, _at: Option<Instant>) -> Result<()> {
        unsupported()
    }

    fn set_promiscuous(&self, _enable: bool) -> Result<()> {
        unsupported()
    }

    fn set_bpf(&self, _program: &[RawInstruction]) -> Result<()> {
        unsupported()
    }

    fn stats(&self) -> Result<Stats> {
        unsupported()
    }

    fn raw_control(&self, _f: &mut dyn FnMut(RawDescriptor)) -> Result<()> {
        unsupported()
    }

    fn raw_read(&self, _f: &mut dyn FnMut(RawDescriptor) -> bool) -> Result<()> {
        unsupported()
    }

    fn raw_write(&self, _f: &mut dyn FnMut(RawDescriptor) -> bool) -> Result<()> {
        unsupported()
    }
}
