//! Capture record parsing
//!
//! Each read returns a record laid out as
//! `[timestamp][caplen u32][datalen u32][hdrlen u16][frame ...]`. The
//! timestamp width differs per dialect, so fields are located from the end
//! of the fixed header.

use linkpacket_core::{Addr, Error, Result};

/// Offset of the source MAC address in an Ethernet frame
const SOURCE_OFFSET: usize = 6;

/// One captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    /// Frame bytes, bounded by the captured length
    pub frame: &'a [u8],
    /// Original length on the wire
    pub wire_len: usize,
    /// Ethernet source address, empty for runt frames
    pub source: Addr,
}

fn field_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Extract the first record from a device read of `buf`
///
/// # Errors
/// [`Error::InvalidArgument`] if `buf` is shorter than the header.
pub fn parse(buf: &[u8], header_len: usize) -> Result<Record<'_>> {
    if buf.len() < header_len {
        return Err(Error::invalid_argument(format!(
            "capture record of {} bytes is shorter than its {header_len}-byte header",
            buf.len()
        )));
    }

    let caplen = field_u32(buf, header_len - 10) as usize;
    let wire_len = field_u32(buf, header_len - 6) as usize;
    let end = header_len.saturating_add(caplen).min(buf.len());
    let frame = &buf[header_len..end];

    let source = match frame.get(SOURCE_OFFSET..SOURCE_OFFSET + 6) {
        Some(mac) => Addr::new(mac)?,
        None => Addr::from_valid_prefix(&[], 0)?,
    };

    Ok(Record {
        frame,
        wire_len,
        source,
    })
}
