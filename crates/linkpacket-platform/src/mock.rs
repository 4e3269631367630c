//! In-memory driver for tests
//!
//! [`MockDriver`] behaves like a capture device: frames handed to
//! [`MockPeer::inject`] run through the installed filter program in the
//! userspace BPF interpreter, and only accepted frames (truncated to the
//! returned length) are queued for [`Driver::read_from`]. With
//! [`Direction::InOut`] written frames are looped back through the filter
//! as well, the way a capture device sees locally sent traffic.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use linkpacket_core::filter::{self, vm, FilterBuilder, RawInstruction};
use linkpacket_core::{
    Addr, Capability, Config, Deadline, Direction, Error, EtherType, Interface, Result,
    SocketType, Stats, Wait,
};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::traits::{Driver, RawDescriptor};

#[derive(Debug, Default)]
struct State {
    program: Vec<RawInstruction>,
    queue: VecDeque<Vec<u8>>,
    sent: Vec<(Vec<u8>, Addr)>,
    promiscuous: bool,
    stats: Stats,
    closed: bool,
}

impl State {
    /// Run the filter and queue the frame if accepted
    fn offer(&mut self, frame: &[u8]) -> Result<bool> {
        let accept = vm::run(&self.program, frame)?;
        if accept == 0 {
            trace!(len = frame.len(), "Filter dropped frame");
            return Ok(false);
        }
        let len = frame.len().min(accept as usize);
        self.queue.push_back(frame[..len].to_vec());
        self.stats.packets = self.stats.packets.saturating_add(1);
        Ok(true)
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    arrived: Condvar,
    read_deadline: Deadline,
    write_deadline: Deadline,
    protocol: EtherType,
    direction: Direction,
}

impl Shared {
    /// Wake readers so they re-examine the queue, deadline and closed flag
    fn wake(&self) {
        let _state = self.state.lock();
        self.arrived.notify_all();
    }
}

/// Test driver backed by an in-memory queue
#[derive(Debug)]
pub struct MockDriver {
    shared: Arc<Shared>,
}

/// Test-side handle of a [`MockDriver`]
#[derive(Debug, Clone)]
pub struct MockPeer {
    shared: Arc<Shared>,
}

impl MockDriver {
    /// Create a driver for `ifi`, installing the protocol filter
    ///
    /// # Errors
    /// [`Error::Unsupported`] for datagram sockets and [`Direction::Out`],
    /// [`Error::InvalidArgument`] for a malformed filter.
    pub fn open(
        ifi: &Interface,
        kind: SocketType,
        protocol: EtherType,
        config: &Config,
    ) -> Result<(Self, MockPeer, Addr)> {
        if kind != SocketType::Raw {
            return Err(Error::unsupported(Capability::SocketType(kind)));
        }
        if config.direction == Direction::Out {
            return Err(Error::unsupported(Capability::Direction(Direction::Out)));
        }

        let program = FilterBuilder::new(protocol)
            .mtu(ifi.mtu)
            .append(&config.filter)
            .build()?;
        debug!(
            interface = %ifi.name,
            protocol = %protocol,
            instructions = program.len(),
            "Opened mock driver"
        );

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                program,
                ..State::default()
            }),
            arrived: Condvar::new(),
            read_deadline: Deadline::new(),
            write_deadline: Deadline::new(),
            protocol,
            direction: config.direction,
        });
        let local = match ifi.hardware_addr {
            Some(addr) => addr,
            None => Addr::from_valid_prefix(&[], 0)?,
        };

        Ok((
            Self {
                shared: Arc::clone(&shared),
            },
            MockPeer { shared },
            local,
        ))
    }
}

impl MockPeer {
    /// Deliver a frame from the wire
    ///
    /// Returns whether the filter accepted it.
    ///
    /// # Errors
    /// [`Error::Closed`] after close, or an interpreter error for a broken
    /// program.
    pub fn inject(&self, frame: &[u8]) -> Result<bool> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        let accepted = state.offer(frame)?;
        if accepted {
            self.shared.arrived.notify_one();
        }
        Ok(accepted)
    }

    /// Frames written so far, with their destinations
    pub fn sent(&self) -> Vec<(Vec<u8>, Addr)> {
        self.shared.state.lock().sent.clone()
    }

    /// Whether promiscuous mode is on
    pub fn is_promiscuous(&self) -> bool {
        self.shared.state.lock().promiscuous
    }

    /// The installed filter program
    pub fn program(&self) -> Vec<RawInstruction> {
        self.shared.state.lock().program.clone()
    }

    /// Frames queued and not yet read
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }
}

impl Driver for MockDriver {
    fn read_from(&self, buf: &mut [u8]) -> Result<(usize, Addr)> {
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(Error::Closed);
            }
            let wait = self.shared.read_deadline.wait();
            if wait == Wait::Expired {
                return Err(Error::Timeout);
            }
            if let Some(frame) = state.queue.pop_front() {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                let source = match frame.get(6..12) {
                    Some(mac) => Addr::new(mac)?,
                    None => Addr::from_valid_prefix(&[], 0)?,
                };
                return Ok((n, source));
            }
            match wait {
                Wait::For(d) => {
                    self.shared.arrived.wait_for(&mut state, d);
                }
                Wait::Forever => self.shared.arrived.wait(&mut state),
                Wait::Expired => return Err(Error::Timeout),
            }
        }
    }

    fn write_to(&self, frame: &[u8], dst: &Addr) -> Result<usize> {
        if dst.is_empty() {
            return Err(Error::invalid_argument("destination hardware address is empty"));
        }
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        if self.shared.write_deadline.wait() == Wait::Expired {
            return Err(Error::Timeout);
        }
        state.sent.push((frame.to_vec(), *dst));
        if self.shared.direction == Direction::InOut && state.offer(frame)? {
            self.shared.arrived.notify_one();
        }
        Ok(frame.len())
    }

    fn close(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(Error::Closed);
            }
            state.closed = true;
            state.queue.clear();
        }
        self.shared.wake();
        debug!(protocol = %self.shared.protocol, "Closed mock driver");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    fn set_read_deadline(&self, at: Option<Instant>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.shared.read_deadline.set(at);
        self.shared.wake();
        Ok(())
    }

    fn set_write_deadline(&self, at: Option<Instant>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.shared.write_deadline.set(at);
        Ok(())
    }

    fn set_promiscuous(&self, enable: bool) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        state.promiscuous = enable;
        Ok(())
    }

    fn set_bpf(&self, program: &[RawInstruction]) -> Result<()> {
        filter::validate(program)?;
        let program = FilterBuilder::new(self.shared.protocol)
            .append(program)
            .build()?;
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        state.program = program;
        Ok(())
    }

    fn stats(&self) -> Result<Stats> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        // Counters reset on read, like PACKET_STATISTICS.
        Ok(std::mem::take(&mut state.stats))
    }

    fn raw_control(&self, _f: &mut dyn FnMut(RawDescriptor)) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Err(Error::unsupported(Capability::RawIo))
    }
}
