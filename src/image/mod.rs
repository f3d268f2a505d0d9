//! Program image handling
//!
//! Loading, checksumming and inspecting the binaries streamed to the device.

pub mod program;

pub use program::ProgramImage;
