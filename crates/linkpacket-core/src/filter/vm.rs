//! Userspace classic BPF interpreter
//!
//! Runs a program over a frame the way the kernel would, returning the
//! number of bytes to accept (zero drops the frame). Loads past the end of
//! the frame and division by a zero X register reject the frame, matching
//! kernel behaviour.

use super::bpf::{
    RawInstruction, BPF_A, BPF_ABS, BPF_ADD, BPF_ALU, BPF_AND, BPF_B, BPF_DIV, BPF_H, BPF_IMM,
    BPF_IND, BPF_JA, BPF_JEQ, BPF_JGE, BPF_JGT, BPF_JMP, BPF_JSET, BPF_LD, BPF_LDX, BPF_LEN,
    BPF_LSH, BPF_MEM, BPF_MISC, BPF_MOD, BPF_MSH, BPF_MUL, BPF_NEG, BPF_OR, BPF_RET, BPF_RSH,
    BPF_ST, BPF_STX, BPF_SUB, BPF_TAX, BPF_TXA, BPF_W, BPF_X, BPF_XOR, SCRATCH_SLOTS,
};
use crate::error::{Error, Result};

fn load(frame: &[u8], off: u32, size: u16) -> Option<u32> {
    let off = usize::try_from(off).ok()?;
    let width = match size {
        BPF_W => 4,
        BPF_H => 2,
        BPF_B => 1,
        _ => return None,
    };
    let bytes = frame.get(off..off.checked_add(width)?)?;
    Some(bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
}

fn alu(op: u16, a: u32, operand: u32) -> Option<u32> {
    let value = match op {
        BPF_ADD => a.wrapping_add(operand),
        BPF_SUB => a.wrapping_sub(operand),
        BPF_MUL => a.wrapping_mul(operand),
        BPF_DIV => a.checked_div(operand)?,
        BPF_MOD => a.checked_rem(operand)?,
        BPF_OR => a | operand,
        BPF_AND => a & operand,
        BPF_XOR => a ^ operand,
        BPF_LSH => a.checked_shl(operand).unwrap_or(0),
        BPF_RSH => a.checked_shr(operand).unwrap_or(0),
        BPF_NEG => a.wrapping_neg(),
        _ => return None,
    };
    Some(value)
}

fn unknown(pc: usize, ins: RawInstruction) -> Error {
    Error::invalid_argument(format!("instruction {pc}: unknown opcode {:#06x}", ins.op))
}

/// Run `program` over `frame`
///
/// # Errors
/// [`Error::InvalidArgument`] for an unknown opcode, an out-of-range
/// scratch slot, or control running past the last instruction.
pub fn run(program: &[RawInstruction], frame: &[u8]) -> Result<u32> {
    let mut a: u32 = 0;
    let mut x: u32 = 0;
    let mut mem = [0u32; SCRATCH_SLOTS as usize];
    let mut pc = 0usize;
    // Frames handed to BPF never approach 4 GiB.
    let frame_len = u32::try_from(frame.len()).unwrap_or(u32::MAX);

    while let Some(&ins) = program.get(pc) {
        let size = ins.op & 0x18;
        let mode = ins.op & 0xe0;
        let slot = || {
            usize::try_from(ins.k)
                .ok()
                .filter(|n| *n < usize::from(SCRATCH_SLOTS))
                .ok_or_else(|| {
                    Error::invalid_argument(format!("instruction {pc}: scratch slot {}", ins.k))
                })
        };

        match ins.class() {
            BPF_LD => {
                a = match mode {
                    BPF_ABS => match load(frame, ins.k, size) {
                        Some(v) => v,
                        None => return Ok(0),
                    },
                    BPF_IND => match load(frame, x.wrapping_add(ins.k), size) {
                        Some(v) => v,
                        None => return Ok(0),
                    },
                    BPF_IMM => ins.k,
                    BPF_MEM => mem[slot()?],
                    BPF_LEN => frame_len,
                    _ => return Err(unknown(pc, ins)),
                };
            }
            BPF_LDX => {
                x = match mode {
                    BPF_IMM => ins.k,
                    BPF_MEM => mem[slot()?],
                    BPF_LEN => frame_len,
                    BPF_MSH => match load(frame, ins.k, BPF_B) {
                        Some(v) => 4 * (v & 0x0f),
                        None => return Ok(0),
                    },
                    _ => return Err(unknown(pc, ins)),
                };
            }
            BPF_ST => mem[slot()?] = a,
            BPF_STX => mem[slot()?] = x,
            BPF_ALU => {
                let operand = if ins.op & BPF_X == BPF_X { x } else { ins.k };
                match alu(ins.op & 0xf0, a, operand) {
                    Some(v) => a = v,
                    None if matches!(ins.op & 0xf0, BPF_DIV | BPF_MOD) => return Ok(0),
                    None => return Err(unknown(pc, ins)),
                }
            }
            BPF_JMP => {
                let op = ins.op & 0xf0;
                if op == BPF_JA {
                    pc = pc + 1 + ins.k as usize;
                    continue;
                }
                let operand = if ins.op & BPF_X == BPF_X { x } else { ins.k };
                let taken = match op {
                    BPF_JEQ => a == operand,
                    BPF_JGT => a > operand,
                    BPF_JGE => a >= operand,
                    BPF_JSET => a & operand != 0,
                    _ => return Err(unknown(pc, ins)),
                };
                let skip = if taken { ins.jt } else { ins.jf };
                pc = pc + 1 + usize::from(skip);
                continue;
            }
            BPF_RET => {
                return match ins.op & 0x18 {
                    BPF_A => Ok(a),
                    BPF_X => Ok(x),
                    _ => Ok(ins.k),
                };
            }
            BPF_MISC => match ins.op & 0xf8 {
                BPF_TAX => x = a,
                BPF_TXA => a = x,
                _ => return Err(unknown(pc, ins)),
            },
            _ => return Err(unknown(pc, ins)),
        }
        pc += 1;
    }

    Err(Error::invalid_argument(format!(
        "control ran past the end of a {}-instruction program",
        program.len()
    )))
}
