//! Kernel packet counters

use serde::Serialize;

/// Packet counters reported by the kernel for one connection
///
/// Only some platforms keep these; the others return an unsupported error
/// instead of zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Frames delivered to the connection
    pub packets: u32,
    /// Frames dropped because the receive buffer was full
    pub drops: u32,
    /// Times the receive ring was frozen (memory-mapped rings only)
    pub freeze_queue_count: u32,
}
