//! Classic BPF instructions
//!
//! [`Instruction`] is the readable form; [`RawInstruction`] is the
//! `{code, jt, jf, k}` encoding every kernel accepts. Jumps are relative to
//! the next instruction, so a program can be appended to another without
//! touching either one's offsets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// Instruction classes
pub(crate) const BPF_LD: u16 = 0x00;
pub(crate) const BPF_LDX: u16 = 0x01;
pub(crate) const BPF_ST: u16 = 0x02;
pub(crate) const BPF_STX: u16 = 0x03;
pub(crate) const BPF_ALU: u16 = 0x04;
pub(crate) const BPF_JMP: u16 = 0x05;
pub(crate) const BPF_RET: u16 = 0x06;
pub(crate) const BPF_MISC: u16 = 0x07;

// Load sizes
pub(crate) const BPF_W: u16 = 0x00;
pub(crate) const BPF_H: u16 = 0x08;
pub(crate) const BPF_B: u16 = 0x10;

// Load modes
pub(crate) const BPF_IMM: u16 = 0x00;
pub(crate) const BPF_ABS: u16 = 0x20;
pub(crate) const BPF_IND: u16 = 0x40;
pub(crate) const BPF_MEM: u16 = 0x60;
pub(crate) const BPF_LEN: u16 = 0x80;
pub(crate) const BPF_MSH: u16 = 0xa0;

// ALU operations
pub(crate) const BPF_ADD: u16 = 0x00;
pub(crate) const BPF_SUB: u16 = 0x10;
pub(crate) const BPF_MUL: u16 = 0x20;
pub(crate) const BPF_DIV: u16 = 0x30;
pub(crate) const BPF_OR: u16 = 0x40;
pub(crate) const BPF_AND: u16 = 0x50;
pub(crate) const BPF_LSH: u16 = 0x60;
pub(crate) const BPF_RSH: u16 = 0x70;
pub(crate) const BPF_NEG: u16 = 0x80;
pub(crate) const BPF_MOD: u16 = 0x90;
pub(crate) const BPF_XOR: u16 = 0xa0;

// Jump operations
pub(crate) const BPF_JA: u16 = 0x00;
pub(crate) const BPF_JEQ: u16 = 0x10;
pub(crate) const BPF_JGT: u16 = 0x20;
pub(crate) const BPF_JGE: u16 = 0x30;
pub(crate) const BPF_JSET: u16 = 0x40;

// Operand sources
pub(crate) const BPF_K: u16 = 0x00;
pub(crate) const BPF_X: u16 = 0x08;
pub(crate) const BPF_A: u16 = 0x10;

// Misc operations
pub(crate) const BPF_TAX: u16 = 0x00;
pub(crate) const BPF_TXA: u16 = 0x80;

/// Number of scratch memory slots
pub const SCRATCH_SLOTS: u8 = 16;

/// Longest program the kernels accept
pub const MAX_INSTRUCTIONS: usize = 4096;

/// A BPF register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Accumulator
    A,
    /// Index register
    X,
}

/// Arithmetic and logic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    /// `A + operand`
    Add,
    /// `A - operand`
    Sub,
    /// `A * operand`
    Mul,
    /// `A / operand`
    Div,
    /// `A | operand`
    Or,
    /// `A & operand`
    And,
    /// `A << operand`
    ShiftLeft,
    /// `A >> operand`
    ShiftRight,
    /// `A % operand`
    Mod,
    /// `A ^ operand`
    Xor,
}

impl AluOp {
    fn code(self) -> u16 {
        match self {
            AluOp::Add => BPF_ADD,
            AluOp::Sub => BPF_SUB,
            AluOp::Mul => BPF_MUL,
            AluOp::Div => BPF_DIV,
            AluOp::Or => BPF_OR,
            AluOp::And => BPF_AND,
            AluOp::ShiftLeft => BPF_LSH,
            AluOp::ShiftRight => BPF_RSH,
            AluOp::Mod => BPF_MOD,
            AluOp::Xor => BPF_XOR,
        }
    }
}

/// Comparison used by conditional jumps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTest {
    /// `A == operand`
    Equal,
    /// `A != operand`
    NotEqual,
    /// `A > operand`
    GreaterThan,
    /// `A < operand`
    LessThan,
    /// `A >= operand`
    GreaterOrEqual,
    /// `A <= operand`
    LessOrEqual,
    /// `A & operand != 0`
    BitsSet,
    /// `A & operand == 0`
    BitsNotSet,
}

impl JumpTest {
    /// Kernel opcode and whether the true/false branches must be swapped
    fn code(self) -> (u16, bool) {
        match self {
            JumpTest::Equal => (BPF_JEQ, false),
            JumpTest::NotEqual => (BPF_JEQ, true),
            JumpTest::GreaterThan => (BPF_JGT, false),
            JumpTest::LessThan => (BPF_JGE, true),
            JumpTest::GreaterOrEqual => (BPF_JGE, false),
            JumpTest::LessOrEqual => (BPF_JGT, true),
            JumpTest::BitsSet => (BPF_JSET, false),
            JumpTest::BitsNotSet => (BPF_JSET, true),
        }
    }
}

/// A classic BPF instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// `A = P[off:off+size]`, size 1, 2 or 4
    LoadAbsolute {
        /// Byte offset into the frame
        off: u32,
        /// Width in bytes
        size: u8,
    },
    /// `A = P[X+off:X+off+size]`
    LoadIndirect {
        /// Byte offset added to X
        off: u32,
        /// Width in bytes
        size: u8,
    },
    /// `X = 4 * (P[off] & 0xf)`, the IPv4 header length idiom
    LoadMemShift {
        /// Byte offset into the frame
        off: u32,
    },
    /// `reg = val`
    LoadConstant {
        /// Destination register
        dst: Register,
        /// Value
        val: u32,
    },
    /// `reg = M[n]`
    LoadScratch {
        /// Destination register
        dst: Register,
        /// Slot, below [`SCRATCH_SLOTS`]
        n: u8,
    },
    /// `M[n] = reg`
    StoreScratch {
        /// Source register
        src: Register,
        /// Slot, below [`SCRATCH_SLOTS`]
        n: u8,
    },
    /// `A = frame length`
    LoadLength,
    /// `A = A op val`
    AluOpConstant {
        /// Operation
        op: AluOp,
        /// Operand
        val: u32,
    },
    /// `A = A op X`
    AluOpX {
        /// Operation
        op: AluOp,
    },
    /// `A = -A`
    NegateA,
    /// Skip `skip` instructions unconditionally
    Jump {
        /// Instructions to skip
        skip: u32,
    },
    /// Compare `A` with a constant and skip accordingly
    JumpIf {
        /// Comparison
        cond: JumpTest,
        /// Constant operand
        val: u32,
        /// Instructions to skip when true
        skip_true: u8,
        /// Instructions to skip when false
        skip_false: u8,
    },
    /// Compare `A` with `X` and skip accordingly
    JumpIfX {
        /// Comparison
        cond: JumpTest,
        /// Instructions to skip when true
        skip_true: u8,
        /// Instructions to skip when false
        skip_false: u8,
    },
    /// Accept `A` bytes of the frame
    RetA,
    /// Accept `val` bytes of the frame, zero drops it
    RetConstant {
        /// Bytes to accept
        val: u32,
    },
    /// `X = A`
    Tax,
    /// `A = X`
    Txa,
}

fn size_code(size: u8) -> Result<u16> {
    match size {
        1 => Ok(BPF_B),
        2 => Ok(BPF_H),
        4 => Ok(BPF_W),
        _ => Err(Error::invalid_argument(format!(
            "invalid load size {size}, must be 1, 2 or 4"
        ))),
    }
}

fn scratch(n: u8) -> Result<u32> {
    if n >= SCRATCH_SLOTS {
        return Err(Error::invalid_argument(format!(
            "scratch slot {n} out of range 0..{SCRATCH_SLOTS}"
        )));
    }
    Ok(u32::from(n))
}

impl Instruction {
    /// Encode into the kernel representation
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for bad load sizes, scratch slots, or a
    /// constant division by zero.
    pub fn assemble(self) -> Result<RawInstruction> {
        let raw = match self {
            Instruction::LoadAbsolute { off, size } => {
                RawInstruction::new(BPF_LD | size_code(size)? | BPF_ABS, 0, 0, off)
            }
            Instruction::LoadIndirect { off, size } => {
                RawInstruction::new(BPF_LD | size_code(size)? | BPF_IND, 0, 0, off)
            }
            Instruction::LoadMemShift { off } => {
                RawInstruction::new(BPF_LDX | BPF_B | BPF_MSH, 0, 0, off)
            }
            Instruction::LoadConstant { dst: Register::A, val } => {
                RawInstruction::new(BPF_LD | BPF_W | BPF_IMM, 0, 0, val)
            }
            Instruction::LoadConstant { dst: Register::X, val } => {
                RawInstruction::new(BPF_LDX | BPF_W | BPF_IMM, 0, 0, val)
            }
            Instruction::LoadScratch { dst: Register::A, n } => {
                RawInstruction::new(BPF_LD | BPF_W | BPF_MEM, 0, 0, scratch(n)?)
            }
            Instruction::LoadScratch { dst: Register::X, n } => {
                RawInstruction::new(BPF_LDX | BPF_W | BPF_MEM, 0, 0, scratch(n)?)
            }
            Instruction::StoreScratch { src: Register::A, n } => {
                RawInstruction::new(BPF_ST, 0, 0, scratch(n)?)
            }
            Instruction::StoreScratch { src: Register::X, n } => {
                RawInstruction::new(BPF_STX, 0, 0, scratch(n)?)
            }
            Instruction::LoadLength => RawInstruction::new(BPF_LD | BPF_W | BPF_LEN, 0, 0, 0),
            Instruction::AluOpConstant { op, val } => {
                if matches!(op, AluOp::Div | AluOp::Mod) && val == 0 {
                    return Err(Error::invalid_argument("constant division by zero"));
                }
                RawInstruction::new(BPF_ALU | op.code() | BPF_K, 0, 0, val)
            }
            Instruction::AluOpX { op } => RawInstruction::new(BPF_ALU | op.code() | BPF_X, 0, 0, 0),
            Instruction::NegateA => RawInstruction::new(BPF_ALU | BPF_NEG, 0, 0, 0),
            Instruction::Jump { skip } => RawInstruction::new(BPF_JMP | BPF_JA, 0, 0, skip),
            Instruction::JumpIf {
                cond,
                val,
                skip_true,
                skip_false,
            } => {
                let (code, swap) = cond.code();
                let (jt, jf) = if swap {
                    (skip_false, skip_true)
                } else {
                    (skip_true, skip_false)
                };
                RawInstruction::new(BPF_JMP | code | BPF_K, jt, jf, val)
            }
            Instruction::JumpIfX {
                cond,
                skip_true,
                skip_false,
            } => {
                let (code, swap) = cond.code();
                let (jt, jf) = if swap {
                    (skip_false, skip_true)
                } else {
                    (skip_true, skip_false)
                };
                RawInstruction::new(BPF_JMP | code | BPF_X, jt, jf, 0)
            }
            Instruction::RetA => RawInstruction::new(BPF_RET | BPF_A, 0, 0, 0),
            Instruction::RetConstant { val } => RawInstruction::new(BPF_RET | BPF_K, 0, 0, val),
            Instruction::Tax => RawInstruction::new(BPF_MISC | BPF_TAX, 0, 0, 0),
            Instruction::Txa => RawInstruction::new(BPF_MISC | BPF_TXA, 0, 0, 0),
        };
        Ok(raw)
    }
}

/// Assemble a whole program
///
/// # Errors
/// The first instruction that fails [`Instruction::assemble`], tagged with
/// its index.
pub fn assemble(program: &[Instruction]) -> Result<Vec<RawInstruction>> {
    program
        .iter()
        .enumerate()
        .map(|(i, ins)| {
            ins.assemble().map_err(|e| match e {
                Error::InvalidArgument { message } => {
                    Error::invalid_argument(format!("instruction {i}: {message}"))
                }
                other => other,
            })
        })
        .collect()
}

/// A kernel-format BPF instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RawInstruction {
    /// Opcode: class, size/op, mode/source
    pub op: u16,
    /// Instructions to skip when a conditional jump is true
    #[serde(default)]
    pub jt: u8,
    /// Instructions to skip when a conditional jump is false
    #[serde(default)]
    pub jf: u8,
    /// Constant operand
    #[serde(default)]
    pub k: u32,
}

impl RawInstruction {
    /// Build from the four kernel fields
    pub const fn new(op: u16, jt: u8, jf: u8, k: u32) -> Self {
        Self { op, jt, jf, k }
    }

    /// Instruction class (`BPF_LD`, `BPF_JMP`, ...)
    pub const fn class(self) -> u16 {
        self.op & 0x07
    }

    /// Whether this is a conditional jump
    pub const fn is_conditional_jump(self) -> bool {
        self.class() == BPF_JMP && (self.op & 0xf0) != BPF_JA
    }

    /// Whether this is a return
    pub const fn is_return(self) -> bool {
        self.class() == BPF_RET
    }

    /// Absolute indices this instruction may transfer control to, given its
    /// own index `pc`
    pub fn successors(self, pc: usize) -> Vec<usize> {
        if self.is_return() {
            return Vec::new();
        }
        if self.class() != BPF_JMP {
            return vec![pc + 1];
        }
        if self.is_conditional_jump() {
            vec![pc + 1 + usize::from(self.jt), pc + 1 + usize::from(self.jf)]
        } else {
            vec![pc + 1 + self.k as usize]
        }
    }
}

fn size_suffix(op: u16) -> &'static str {
    match op & 0x18 {
        BPF_H => "h",
        BPF_B => "b",
        _ => "",
    }
}

impl fmt::Display for RawInstruction {
    /// tcpdump-style mnemonic, without the line number
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.op;
        let k = self.k;
        match self.class() {
            BPF_LD => match op & 0xe0 {
                BPF_ABS => write!(f, "ld{} [{k}]", size_suffix(op)),
                BPF_IND => write!(f, "ld{} [x + {k}]", size_suffix(op)),
                BPF_IMM => write!(f, "ld #{k:#x}"),
                BPF_MEM => write!(f, "ld M[{k}]"),
                BPF_LEN => f.write_str("ld #len"),
                _ => write!(f, "unknown op {op:#06x}"),
            },
            BPF_LDX => match op & 0xe0 {
                BPF_MSH => write!(f, "ldxb 4*([{k}]&0xf)"),
                BPF_IMM => write!(f, "ldx #{k:#x}"),
                BPF_MEM => write!(f, "ldx M[{k}]"),
                BPF_LEN => f.write_str("ldx #len"),
                _ => write!(f, "unknown op {op:#06x}"),
            },
            BPF_ST => write!(f, "st M[{k}]"),
            BPF_STX => write!(f, "stx M[{k}]"),
            BPF_ALU => {
                let name = match op & 0xf0 {
                    BPF_ADD => "add",
                    BPF_SUB => "sub",
                    BPF_MUL => "mul",
                    BPF_DIV => "div",
                    BPF_OR => "or",
                    BPF_AND => "and",
                    BPF_LSH => "lsh",
                    BPF_RSH => "rsh",
                    BPF_NEG => return f.write_str("neg"),
                    BPF_MOD => "mod",
                    BPF_XOR => "xor",
                    _ => return write!(f, "unknown op {op:#06x}"),
                };
                if op & BPF_X == BPF_X {
                    write!(f, "{name} x")
                } else {
                    write!(f, "{name} #{k:#x}")
                }
            }
            BPF_JMP => {
                let name = match op & 0xf0 {
                    BPF_JA => return write!(f, "ja +{k}"),
                    BPF_JEQ => "jeq",
                    BPF_JGT => "jgt",
                    BPF_JGE => "jge",
                    BPF_JSET => "jset",
                    _ => return write!(f, "unknown op {op:#06x}"),
                };
                let operand = if op & BPF_X == BPF_X {
                    "x".to_string()
                } else {
                    format!("#{k:#x}")
                };
                write!(f, "{name} {operand} jt +{} jf +{}", self.jt, self.jf)
            }
            BPF_RET => match op & 0x18 {
                BPF_A => f.write_str("ret a"),
                BPF_X => f.write_str("ret x"),
                _ => write!(f, "ret #{k}"),
            },
            BPF_MISC => match op & 0xf8 {
                BPF_TAX => f.write_str("tax"),
                BPF_TXA => f.write_str("txa"),
                _ => write!(f, "unknown op {op:#06x}"),
            },
            _ => write!(f, "unknown op {op:#06x}"),
        }
    }
}

/// Check that a raw program is complete and self-contained
///
/// Every jump must land inside the program, scratch slots must exist, and
/// the last instruction must be a return.
///
/// # Errors
/// [`Error::InvalidArgument`] naming the first offending instruction.
pub fn validate(program: &[RawInstruction]) -> Result<()> {
    if program.is_empty() {
        return Err(Error::invalid_argument("filter program is empty"));
    }
    if program.len() > MAX_INSTRUCTIONS {
        return Err(Error::invalid_argument(format!(
            "filter program has {} instructions, maximum is {MAX_INSTRUCTIONS}",
            program.len()
        )));
    }

    for (pc, ins) in program.iter().enumerate() {
        let class = ins.class();
        let mode = ins.op & 0xe0;
        let uses_scratch = matches!(class, BPF_ST | BPF_STX)
            || (matches!(class, BPF_LD | BPF_LDX) && mode == BPF_MEM);
        if uses_scratch && ins.k >= u32::from(SCRATCH_SLOTS) {
            return Err(Error::invalid_argument(format!(
                "instruction {pc}: scratch slot {} out of range",
                ins.k
            )));
        }
        if class == BPF_ALU
            && matches!(ins.op & 0xf0, BPF_DIV | BPF_MOD)
            && ins.op & BPF_X == 0
            && ins.k == 0
        {
            return Err(Error::invalid_argument(format!(
                "instruction {pc}: constant division by zero"
            )));
        }
        if let Some(target) = ins.successors(pc).into_iter().find(|t| *t >= program.len()) {
            return Err(Error::invalid_argument(format!(
                "instruction {pc}: jump target {target} beyond program of {} instructions",
                program.len()
            )));
        }
    }

    // successors() already rejected a non-return last instruction, since
    // falling through from it lands past the end.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_absolute_half() {
        let raw = Instruction::LoadAbsolute { off: 12, size: 2 }.assemble().unwrap();
        assert_eq!(raw, RawInstruction::new(0x28, 0, 0, 12));
        assert_eq!(raw.to_string(), "ldh [12]");
    }

    #[test]
    fn test_jump_equal() {
        let raw = Instruction::JumpIf {
            cond: JumpTest::Equal,
            val: 0x0800,
            skip_true: 1,
            skip_false: 0,
        }
        .assemble()
        .unwrap();
        assert_eq!(raw, RawInstruction::new(0x15, 1, 0, 0x0800));
    }

    #[test]
    fn test_negated_tests_swap_branches() {
        let ne = Instruction::JumpIf {
            cond: JumpTest::NotEqual,
            val: 7,
            skip_true: 3,
            skip_false: 0,
        }
        .assemble()
        .unwrap();
        assert_eq!(ne, RawInstruction::new(0x15, 0, 3, 7));

        let lt = Instruction::JumpIf {
            cond: JumpTest::LessThan,
            val: 60,
            skip_true: 2,
            skip_false: 1,
        }
        .assemble()
        .unwrap();
        assert_eq!(lt, RawInstruction::new(BPF_JMP | BPF_JGE | BPF_K, 1, 2, 60));
    }

    #[test]
    fn test_returns() {
        assert_eq!(
            Instruction::RetConstant { val: 0 }.assemble().unwrap(),
            RawInstruction::new(0x06, 0, 0, 0)
        );
        assert_eq!(
            Instruction::RetA.assemble().unwrap(),
            RawInstruction::new(0x16, 0, 0, 0)
        );
    }

    #[test]
    fn test_bad_size_rejected() {
        let err = assemble(&[Instruction::LoadAbsolute { off: 0, size: 3 }]).unwrap_err();
        assert!(err.to_string().contains("instruction 0"));
    }

    #[test]
    fn test_scratch_bounds() {
        assert!(Instruction::StoreScratch { src: Register::A, n: 15 }.assemble().is_ok());
        assert!(Instruction::StoreScratch { src: Register::A, n: 16 }.assemble().is_err());
    }

    #[test]
    fn test_constant_div_zero_rejected() {
        assert!(Instruction::AluOpConstant { op: AluOp::Div, val: 0 }.assemble().is_err());
        assert!(Instruction::AluOpConstant { op: AluOp::Div, val: 2 }.assemble().is_ok());
    }

    #[test]
    fn test_validate() {
        let ok = [
            RawInstruction::new(0x28, 0, 0, 12),
            RawInstruction::new(0x15, 0, 1, 0x0806),
            RawInstruction::new(0x06, 0, 0, 0xffff),
            RawInstruction::new(0x06, 0, 0, 0),
        ];
        assert!(validate(&ok).is_ok());

        // jf runs off the end
        let bad_jump = [
            RawInstruction::new(0x28, 0, 0, 12),
            RawInstruction::new(0x15, 0, 2, 0x0806),
            RawInstruction::new(0x06, 0, 0, 0),
        ];
        assert!(validate(&bad_jump).is_err());

        // falls off the end without returning
        let no_ret = [RawInstruction::new(0x28, 0, 0, 12)];
        assert!(validate(&no_ret).is_err());

        assert!(validate(&[]).is_err());
    }

    #[test]
    fn test_display_jump() {
        let raw = RawInstruction::new(0x15, 1, 0, 0x0800);
        assert_eq!(raw.to_string(), "jeq #0x800 jt +1 jf +0");
    }
}
