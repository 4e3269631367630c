//! # linkpacket core
//!
//! Platform-independent building blocks for link-layer packet connections.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Hardware addresses** - [`Addr`], bounded by [`MAX_ADDR_LEN`]
//! - **Filter programs** - classic BPF assembly, composition and interpretation
//! - **Configuration** - [`Config`], [`Direction`], [`SocketType`], [`EtherType`]
//! - **Errors** - the driver [`Error`] taxonomy and the caller-facing [`OpError`]
//! - **Deadlines** - [`Deadline`] and the bounded wait computation used by drivers
//!
//! The drivers that talk to the kernel live in `linkpacket-platform`.
//!
//! ## Example
//!
//! ```rust
//! use linkpacket_core::filter::FilterBuilder;
//! use linkpacket_core::EtherType;
//!
//! let program = FilterBuilder::new(EtherType::IPV4).mtu(1500).build()?;
//! assert_eq!(program.len(), 4);
//! # Ok::<(), linkpacket_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod addr;
pub mod config;
pub mod deadline;
pub mod error;
pub mod filter;
pub mod interface;
pub mod stats;

// Re-exports for convenience
pub use addr::{Addr, MAX_ADDR_LEN};
pub use config::{Config, Direction, EtherType, SocketType};
pub use deadline::{Deadline, Wait};
pub use error::{op_error, Capability, Error, Op, OpError, Result, NETWORK};
pub use interface::{Interface, InterfaceFlags};
pub use stats::Stats;
