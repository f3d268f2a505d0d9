//! Device handshake protocol
//!
//! The processor talks plain text over its UART. Two line prefixes are
//! requests for the host to act:
//!
//! - `Load program...` asks for a program image, answered by a paced byte
//!   stream closed with a [`Terminator`]
//! - `Breakpoint...` reports a trap, answered by a single debug command byte
//!
//! Everything else is device output for the operator.

pub mod breakpoint;
pub mod transfer;

pub use breakpoint::{BreakpointChoice, DebugCommand};
pub use transfer::{send_program, TransferReport};

use std::fmt;
use std::time::Duration;

/// Prefix of the device's program request
pub const LOAD_PROGRAM_PREFIX: &str = "Load program";

/// Prefix of the device's breakpoint notification
pub const BREAKPOINT_PREFIX: &str = "Breakpoint";

/// Inter-byte delay used by paced transfers unless overridden
pub const DEFAULT_PACE: Duration = Duration::from_millis(20);

/// Wait before draining stale input ahead of a transfer
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

/// A classified line of device output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLine {
    /// The device is waiting for a program image
    ProgramLoadRequest(String),
    /// The device stopped at a breakpoint and waits for a debug command
    BreakpointHit(String),
    /// Ordinary output to show the operator
    PlainOutput(String),
}

/// Classify one line of device output
///
/// Matching is an exact, case-sensitive prefix test. Returns `None` for
/// lines that are empty after trimming; those carry no meaning at all.
pub fn classify(line: &str) -> Option<DeviceLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let kind = if line.starts_with(LOAD_PROGRAM_PREFIX) {
        DeviceLine::ProgramLoadRequest(line.to_string())
    } else if line.starts_with(BREAKPOINT_PREFIX) {
        DeviceLine::BreakpointHit(line.to_string())
    } else {
        DeviceLine::PlainOutput(line.to_string())
    };
    Some(kind)
}

/// End-of-image marker, one per protocol revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Terminator {
    /// Four `0xFF` bytes
    #[default]
    #[value(name = "four-ff")]
    FourFF,
    /// The ASCII bytes `IMDONE`
    #[value(name = "im-done")]
    ImDone,
}

impl Terminator {
    /// The bytes written after the payload
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Terminator::FourFF => &[0xFF, 0xFF, 0xFF, 0xFF],
            Terminator::ImDone => b"IMDONE",
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::FourFF => write!(f, "4 x 0xFF"),
            Terminator::ImDone => write!(f, "\"IMDONE\""),
        }
    }
}

/// How bytes are spaced on the wire during a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Payload and terminator are written back to back
    None,
    /// Every byte is followed by a fixed delay
    Fixed(Duration),
}

impl Pacing {
    /// Delay after each byte, if any
    pub fn per_byte_delay(&self) -> Option<Duration> {
        match self {
            Pacing::None => None,
            Pacing::Fixed(delay) => Some(*delay),
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::Fixed(DEFAULT_PACE)
    }
}

impl fmt::Display for Pacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pacing::None => write!(f, "unpaced"),
            Pacing::Fixed(delay) => write!(f, "{} ms per byte", delay.as_millis()),
        }
    }
}

/// The protocol revision the host speaks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub terminator: Terminator,
    pub pacing: Pacing,
    /// Wait before the input buffer is drained at transfer start
    pub settle_delay: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            terminator: Terminator::default(),
            pacing: Pacing::default(),
            settle_delay: DEFAULT_SETTLE,
        }
    }
}

impl ProtocolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the end-of-image marker
    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Set the byte pacing
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Set the settle delay ahead of the input drain
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Lower bound on the wire time of a payload, pacing only
    pub fn min_transfer_time(&self, payload_len: usize) -> Duration {
        let total = payload_len + self.terminator.bytes().len();
        match self.pacing.per_byte_delay() {
            Some(delay) => delay.saturating_mul(u32::try_from(total).unwrap_or(u32::MAX)),
            None => Duration::ZERO,
        }
    }
}
