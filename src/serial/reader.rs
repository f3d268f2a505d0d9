//! Line reader for device output
//!
//! Pulls bytes off the link one at a time until a newline or the read
//! timeout, then decodes them as UTF-8. Text that fails to decode is logged
//! and dropped; it never ends the session.

use super::link::{is_idle_error, DeviceLink};
use crate::error::{SessionError, SessionResult};
use log::{debug, warn};
use std::io;

/// Longest line kept before it is handed out without a newline
pub const MAX_LINE_LEN: usize = 4096;

/// Consecutive zero-length reads taken as end of stream
pub const EOF_READ_LIMIT: usize = 3;

/// Reads trimmed text lines from a device link
#[derive(Debug, Default)]
pub struct LineReader {
    decode_failures: usize,
    empty_reads: usize,
    /// Bytes of a character split by the line cap, kept for the next line
    carry: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines dropped because they were not valid UTF-8
    pub fn decode_failures(&self) -> usize {
        self.decode_failures
    }

    /// Read one line from the device
    ///
    /// Returns `Ok(None)` when the read timeout elapsed with nothing received
    /// or when the received bytes were not text. A partial line that was cut
    /// short by the timeout is returned as-is. The returned text has its
    /// surrounding whitespace (including `\r`) removed and may be empty.
    ///
    /// A line longer than [`MAX_LINE_LEN`] is handed out in pieces, each cut
    /// on a character boundary.
    pub fn read_line<L: DeviceLink + ?Sized>(
        &mut self,
        link: &mut L,
    ) -> SessionResult<Option<String>> {
        let mut buffer = std::mem::take(&mut self.carry);
        let mut byte = [0u8; 1];

        loop {
            match link.read(&mut byte) {
                Ok(1) => {
                    self.empty_reads = 0;
                    if byte[0] == b'\n' {
                        break;
                    }
                    buffer.push(byte[0]);
                    if buffer.len() >= MAX_LINE_LEN {
                        debug!("Line reached {} bytes without a newline", MAX_LINE_LEN);
                        self.carry = split_incomplete_char(&mut buffer);
                        break;
                    }
                }
                Ok(_) => {
                    self.empty_reads += 1;
                    if self.empty_reads >= EOF_READ_LIMIT {
                        return Err(SessionError::ConnectionLost(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "serial port returned end of stream",
                        )));
                    }
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if is_idle_error(e) => {
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Err(e) => return Err(SessionError::ConnectionLost(e)),
            }
        }

        match String::from_utf8(buffer) {
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(e) => {
                self.decode_failures += 1;
                warn!(
                    "Dropped {} bytes of undecodable device output: {}",
                    e.as_bytes().len(),
                    e.utf8_error()
                );
                Ok(None)
            }
        }
    }
}

/// Remove and return the bytes of a character cut off at the end of `buffer`
///
/// Only an incomplete trailing sequence is split off; invalid bytes earlier in
/// the buffer are left for the decoder to reject.
fn split_incomplete_char(buffer: &mut Vec<u8>) -> Vec<u8> {
    match std::str::from_utf8(buffer) {
        Err(e) if e.error_len().is_none() => buffer.split_off(e.valid_up_to()),
        _ => Vec::new(),
    }
}
