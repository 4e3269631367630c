//! Classic BPF filter programs
//!
//! - [`bpf`]: instruction encoding and validation
//! - [`compiler`]: protocol and MTU filters, composition with caller programs
//! - [`vm`]: a userspace interpreter used where no kernel runs the program

pub mod bpf;
pub mod compiler;
pub mod vm;

pub use bpf::{
    assemble, validate, AluOp, Instruction, JumpTest, RawInstruction, Register, MAX_INSTRUCTIONS,
};
pub use compiler::{base_filter, compose, interface_filter, FilterBuilder};
