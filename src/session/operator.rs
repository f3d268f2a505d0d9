//! Operator prompts
//!
//! The dispatcher asks the operator for two things mid-session: a program
//! path and a breakpoint action. Startup also asks for a port and a baud
//! rate when they were not given on the command line.

use crate::error::{SessionError, SessionResult};
use crate::protocol::BreakpointChoice;
use log::warn;
use std::io::{self, BufRead, Write};

/// Answers the questions the dispatcher asks during a session
pub trait Operator {
    /// Path of the program image to send
    fn program_path(&mut self) -> String;

    /// Action to take at a breakpoint
    fn breakpoint_choice(&mut self) -> BreakpointChoice;
}

/// Operator sitting at this terminal
#[derive(Debug, Default)]
pub struct ConsoleOperator;

impl ConsoleOperator {
    pub fn new() -> Self {
        Self
    }
}

impl Operator for ConsoleOperator {
    fn program_path(&mut self) -> String {
        prompt("Enter path to program binary: ").unwrap_or_else(|e| {
            warn!("Could not read program path: {}", e);
            String::new()
        })
    }

    fn breakpoint_choice(&mut self) -> BreakpointChoice {
        match prompt("Breakpoint hit. Enter 'd' to dump memory or 'c' to continue: ") {
            Ok(answer) => BreakpointChoice::parse(&answer),
            Err(e) => {
                warn!("Could not read breakpoint choice: {}", e);
                BreakpointChoice::Continue
            }
        }
    }
}

/// Print a prompt and read one line from stdin
fn prompt(label: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", label)?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

/// Ask which of `count` listed ports to open
pub fn prompt_port_selection(count: usize) -> SessionResult<usize> {
    println!("Select FPGA UART port to connect to:");
    let answer = prompt("Port: ").map_err(SessionError::Console)?;
    parse_port_index(&answer, count)
}

/// Ask for the baud rate
pub fn prompt_baud_rate() -> SessionResult<u32> {
    let answer = prompt("Enter baud rate (e.g., 115200): ").map_err(SessionError::Console)?;
    parse_baud_rate(&answer)
}

pub fn parse_port_index(input: &str, count: usize) -> SessionResult<usize> {
    let index: usize = input.trim().parse().map_err(|_| {
        SessionError::InvalidOperatorInput(format!("'{}' is not a port number", input.trim()))
    })?;

    if index >= count {
        return Err(SessionError::InvalidOperatorInput(format!(
            "port {} is out of range (0..{})",
            index, count
        )));
    }
    Ok(index)
}

pub fn parse_baud_rate(input: &str) -> SessionResult<u32> {
    match input.trim().parse::<u32>() {
        Ok(baud) if baud > 0 => Ok(baud),
        _ => Err(SessionError::InvalidOperatorInput(format!(
            "'{}' is not a baud rate",
            input.trim()
        ))),
    }
}
