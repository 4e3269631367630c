//! Protocol and MTU filters
//!
//! Capture devices that cannot filter by protocol on their own get the
//! program from [`interface_filter`], or [`base_filter`] followed by the
//! caller's program. Composition never rewrites offsets: the base program
//! ends by falling through into the first appended instruction.

use tracing::debug;

use super::bpf::{self, Instruction, JumpTest, RawInstruction};
use crate::config::EtherType;
use crate::error::Result;

/// Byte offset of the EtherType field in an Ethernet frame
pub const ETHERTYPE_OFFSET: u32 = 12;

/// Snap length used when neither an MTU nor a caller program bounds it
pub const DEFAULT_SNAPLEN: u32 = 262_144;

/// Load the EtherType and drop frames of any other protocol
///
/// Matching frames fall through past the end of this program, so it must
/// be followed by a return or a caller program.
///
/// ```text
/// ldh [12]
/// jeq #proto jt +1 jf +0
/// ret #0
/// ```
pub fn base_filter(proto: EtherType) -> Vec<Instruction> {
    vec![
        Instruction::LoadAbsolute {
            off: ETHERTYPE_OFFSET,
            size: 2,
        },
        Instruction::JumpIf {
            cond: JumpTest::Equal,
            val: u32::from(proto.value()),
            skip_true: 1,
            skip_false: 0,
        },
        Instruction::RetConstant { val: 0 },
    ]
}

/// [`base_filter`] followed by accepting up to `mtu` bytes
pub fn interface_filter(proto: EtherType, mtu: u32) -> Vec<Instruction> {
    let mut program = base_filter(proto);
    program.push(Instruction::RetConstant { val: mtu });
    program
}

/// Append a caller program to a base program unchanged
pub fn compose(base: &[RawInstruction], user: &[RawInstruction]) -> Vec<RawInstruction> {
    let mut program = Vec::with_capacity(base.len() + user.len());
    program.extend_from_slice(base);
    program.extend_from_slice(user);
    program
}

/// Builder for the program installed on a capture device
///
/// # Example
///
/// ```
/// use linkpacket_core::{filter::FilterBuilder, EtherType};
///
/// let program = FilterBuilder::new(EtherType::ARP).mtu(1500).build()?;
/// assert_eq!(program.len(), 4);
/// assert_eq!(program[3].k, 1500);
/// # Ok::<(), linkpacket_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    protocol: EtherType,
    mtu: Option<u32>,
    user: Vec<RawInstruction>,
}

impl FilterBuilder {
    /// Start a filter for `protocol`
    pub fn new(protocol: EtherType) -> Self {
        Self {
            protocol,
            mtu: None,
            user: Vec::new(),
        }
    }

    /// Accept up to `mtu` bytes of matching frames
    ///
    /// Ignored once a caller program is appended; its returns decide the
    /// accepted length.
    #[must_use]
    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    /// Run `program` on frames that passed the protocol check
    #[must_use]
    pub fn append(mut self, program: &[RawInstruction]) -> Self {
        self.user.extend_from_slice(program);
        self
    }

    /// Assemble and validate the program
    ///
    /// # Errors
    /// [`crate::Error::InvalidArgument`] if the appended program is not
    /// self-contained.
    pub fn build(self) -> Result<Vec<RawInstruction>> {
        let program = if self.user.is_empty() {
            let snaplen = self.mtu.unwrap_or(DEFAULT_SNAPLEN);
            bpf::assemble(&interface_filter(self.protocol, snaplen))?
        } else {
            let base = bpf::assemble(&base_filter(self.protocol))?;
            compose(&base, &self.user)
        };
        bpf::validate(&program)?;

        debug!(
            protocol = %self.protocol,
            instructions = program.len(),
            "Built capture filter"
        );
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_filter_encoding() {
        let raw = bpf::assemble(&base_filter(EtherType::IPV4)).unwrap();
        assert_eq!(
            raw,
            vec![
                RawInstruction::new(0x28, 0, 0, 12),
                RawInstruction::new(0x15, 1, 0, 0x0800),
                RawInstruction::new(0x06, 0, 0, 0),
            ]
        );
    }

    #[test]
    fn test_interface_filter_appends_mtu() {
        let program = interface_filter(EtherType::ARP, 1500);
        assert_eq!(program.len(), 4);
        assert_eq!(program[3], Instruction::RetConstant { val: 1500 });
    }

    #[test]
    fn test_compose_keeps_user_unchanged() {
        let base = bpf::assemble(&base_filter(EtherType::IPV4)).unwrap();
        let user = vec![
            RawInstruction::new(0x30, 0, 0, 23),
            RawInstruction::new(0x15, 0, 1, 6),
            RawInstruction::new(0x06, 0, 0, 0xffff),
            RawInstruction::new(0x06, 0, 0, 0),
        ];
        let out = compose(&base, &user);
        assert_eq!(out.len(), base.len() + user.len());
        assert_eq!(&out[..3], &base[..]);
        assert_eq!(&out[3..], &user[..]);
    }

    #[test]
    fn test_builder_without_user_or_mtu() {
        let program = FilterBuilder::new(EtherType::IPV6).build().unwrap();
        assert_eq!(program.len(), 4);
        assert_eq!(program[3].k, DEFAULT_SNAPLEN);
    }

    #[test]
    fn test_builder_user_overrides_mtu() {
        let user = [RawInstruction::new(0x06, 0, 0, 64)];
        let program = FilterBuilder::new(EtherType::IPV4)
            .mtu(1500)
            .append(&user)
            .build()
            .unwrap();
        assert_eq!(program.len(), 4);
        assert_eq!(program[3].k, 64);
    }

    #[test]
    fn test_builder_rejects_incomplete_user() {
        let user = [RawInstruction::new(0x28, 0, 0, 12)];
        assert!(FilterBuilder::new(EtherType::IPV4)
            .append(&user)
            .build()
            .is_err());
    }
}
