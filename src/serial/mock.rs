//! Scripted in-memory device link for tests

use super::link::DeviceLink;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

/// One observable action performed on the link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOp {
    Write(Vec<u8>),
    Pause(Duration),
    Flush,
    Discard,
}

/// A device link fed from a script of incoming bytes
///
/// Once the script is drained reads time out, fail with `BrokenPipe`
/// ([`MockLink::hang_up_when_drained`]) or return `Ok(0)`
/// ([`MockLink::eof_when_drained`]).
#[derive(Debug, Default)]
pub struct MockLink {
    input: VecDeque<u8>,
    ops: Vec<LinkOp>,
    hang_up: bool,
    eof: bool,
    fail_writes: bool,
    bytes_read: usize,
    interrupt_after: Option<usize>,
}

impl MockLink {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn hang_up_when_drained(mut self) -> Self {
        self.hang_up = true;
        self
    }

    pub fn eof_when_drained(mut self) -> Self {
        self.eof = true;
        self
    }

    /// Fail one read with `Interrupted` once `count` bytes have been read
    pub fn interrupt_after(mut self, count: usize) -> Self {
        self.interrupt_after = Some(count);
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Queue more device output
    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    pub fn ops(&self) -> &[LinkOp] {
        &self.ops
    }

    /// Every byte written, in order
    pub fn written(&self) -> Vec<u8> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                LinkOp::Write(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupt_after == Some(self.bytes_read) {
            self.interrupt_after = None;
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }

        if self.input.is_empty() {
            if self.eof {
                return Ok(0);
            }
            let kind = if self.hang_up {
                io::ErrorKind::BrokenPipe
            } else {
                io::ErrorKind::TimedOut
            };
            return Err(io::Error::from(kind));
        }

        let mut n = 0;
        while n < buf.len() {
            match self.input.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                    self.bytes_read += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.ops.push(LinkOp::Write(buf.to_vec()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ops.push(LinkOp::Flush);
        Ok(())
    }
}

impl DeviceLink for MockLink {
    fn discard_input(&mut self) -> io::Result<()> {
        self.input.clear();
        self.ops.push(LinkOp::Discard);
        Ok(())
    }

    fn pause(&mut self, duration: Duration) {
        self.ops.push(LinkOp::Pause(duration));
    }
}
