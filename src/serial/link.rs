//! The device connection as the handshake protocol sees it

use std::io::{self, Read, Write};
use std::time::Duration;

/// A byte channel to the device
///
/// Reads are expected to honour the connection's read timeout and report it
/// as `ErrorKind::TimedOut` (or `Ok(0)`) rather than blocking forever.
pub trait DeviceLink: Read + Write {
    /// Drop every byte the driver has already queued on the input side
    fn discard_input(&mut self) -> io::Result<()>;

    /// Wait between paced writes
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// True for read errors that only mean "nothing arrived this tick"
///
/// `Interrupted` is not one of them: the read is retried instead.
pub fn is_idle_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
