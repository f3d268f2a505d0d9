//! Serial link to the processor
//!
//! This module provides:
//! - The `DeviceLink` abstraction the handshake protocol writes through
//! - Reading trimmed text lines from the device
//! - The real serial port backend and port enumeration (`serial` feature)

pub mod link;
#[cfg(test)]
pub mod mock;
#[cfg(feature = "serial")]
pub mod port;
pub mod reader;

pub use link::DeviceLink;
#[cfg(feature = "serial")]
pub use port::{PortConfig, SerialConnection};
pub use reader::LineReader;
