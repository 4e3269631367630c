//! Linux `AF_PACKET` implementation

mod driver;
mod sys;

pub use driver::LinuxDriver;
