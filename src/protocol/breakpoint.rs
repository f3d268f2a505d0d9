//! Breakpoint exchange
//!
//! When the device reports a breakpoint it waits for one command byte. A
//! dump request is always followed by a continue, so every exchange resumes
//! the program. No acknowledgement is read back.

use crate::error::{SessionError, SessionResult};
use crate::serial::DeviceLink;

/// Single-byte debug commands understood by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    /// `d`: dump registers and memory
    Dump,
    /// `c`: resume execution
    Continue,
}

impl DebugCommand {
    pub fn byte(self) -> u8 {
        match self {
            DebugCommand::Dump => b'd',
            DebugCommand::Continue => b'c',
        }
    }

    /// Operator-facing confirmation once the byte is on the wire
    pub fn sent_message(self) -> &'static str {
        match self {
            DebugCommand::Dump => "Memory dump command sent.",
            DebugCommand::Continue => "Continue command sent.",
        }
    }
}

/// What the operator wants done at a breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakpointChoice {
    Dump,
    #[default]
    Continue,
}

impl BreakpointChoice {
    /// Interpret operator input; anything unrecognised means continue
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "d" | "dump" => BreakpointChoice::Dump,
            _ => BreakpointChoice::Continue,
        }
    }

    /// Commands to send, in order
    pub fn commands(self) -> &'static [DebugCommand] {
        match self {
            BreakpointChoice::Dump => &[DebugCommand::Dump, DebugCommand::Continue],
            BreakpointChoice::Continue => &[DebugCommand::Continue],
        }
    }
}

/// Write one debug command byte to the device
pub fn send_command<L: DeviceLink + ?Sized>(
    link: &mut L,
    command: DebugCommand,
) -> SessionResult<()> {
    link.write_all(&[command.byte()])
        .and_then(|_| link.flush())
        .map_err(SessionError::ConnectionLost)
}
