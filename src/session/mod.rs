//! Terminal session and handshake dispatcher
//!
//! A session owns the device link for its whole life. Each pass of the loop
//! reads one line, classifies it on its own (no memory of earlier lines)
//! and either echoes it or runs the matching sub-protocol to completion
//! before reading again:
//!
//! ```text
//!   Idle --line--> Dispatching --echo | transfer | breakpoint--> Idle
//! ```
//!
//! The loop only ends on a fatal error, normally a lost connection.

pub mod operator;
pub mod transcript;

pub use operator::{ConsoleOperator, Operator};
pub use transcript::Transcript;

use crate::error::{SessionError, SessionResult};
use crate::image::ProgramImage;
use crate::protocol::breakpoint::send_command;
use crate::protocol::{
    classify, send_program, BreakpointChoice, DeviceLine, ProtocolConfig, TransferReport,
};
use crate::serial::{DeviceLink, LineReader};
use colored::Colorize;
use log::{debug, info, warn};
use std::io::Write;

/// Where the dispatcher is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next line
    Idle,
    /// Handling a classified line
    Dispatching,
}

/// What one pass of the loop did
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Nothing usable arrived (timeout, blank or undecodable line)
    Quiet,
    /// A line was shown to the operator
    Echoed(String),
    /// A program image was sent
    ProgramLoaded(TransferReport),
    /// The image could not be read; nothing was sent
    TransferAborted(String),
    /// A breakpoint was answered
    BreakpointHandled(BreakpointChoice),
}

/// Counters shown when a session ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub lines_echoed: usize,
    pub transfers: usize,
    pub aborted_transfers: usize,
    pub bytes_sent: usize,
    pub breakpoints: usize,
}

/// A running terminal session
pub struct Session<L, O, D> {
    link: L,
    operator: O,
    display: D,
    protocol: ProtocolConfig,
    reader: LineReader,
    transcript: Option<Transcript>,
    state: SessionState,
    stats: SessionStats,
}

impl<L, O, D> Session<L, O, D>
where
    L: DeviceLink,
    O: Operator,
    D: Write,
{
    pub fn new(link: L, operator: O, display: D, protocol: ProtocolConfig) -> Self {
        Self {
            link,
            operator,
            display,
            protocol,
            reader: LineReader::new(),
            transcript: None,
            state: SessionState::Idle,
            stats: SessionStats::default(),
        }
    }

    /// Also record the session to a transcript file
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Run until a fatal error and return it
    pub fn run(&mut self) -> SessionError {
        info!(
            "Session started ({}, terminator {})",
            self.protocol.pacing, self.protocol.terminator
        );
        loop {
            if let Err(e) = self.step() {
                return e;
            }
        }
    }

    /// Read and handle a single line
    pub fn step(&mut self) -> SessionResult<Event> {
        let line = match self.reader.read_line(&mut self.link)? {
            Some(line) => line,
            None => return Ok(Event::Quiet),
        };
        let Some(kind) = classify(&line) else {
            return Ok(Event::Quiet);
        };

        self.state = SessionState::Dispatching;
        debug!("{:?}: {:?}", self.state, kind);
        let result = self.dispatch(kind);
        self.state = SessionState::Idle;
        result
    }

    fn dispatch(&mut self, kind: DeviceLine) -> SessionResult<Event> {
        match kind {
            DeviceLine::PlainOutput(text) => self.echo(text),
            DeviceLine::ProgramLoadRequest(text) => self.load_program(&text),
            DeviceLine::BreakpointHit(text) => self.breakpoint(&text),
        }
    }

    fn echo(&mut self, text: String) -> SessionResult<Event> {
        writeln!(self.display, "{}", text)
            .and_then(|_| self.display.flush())
            .map_err(SessionError::Console)?;
        self.record_line(&text);
        self.stats.lines_echoed += 1;
        Ok(Event::Echoed(text))
    }

    fn load_program(&mut self, text: &str) -> SessionResult<Event> {
        self.record_line(text);
        self.notice("[*]".cyan().bold(), "Program load request detected.")?;
        self.record_event("program load request");

        let path = self.operator.program_path();
        let image = match ProgramImage::load(&path) {
            Ok(image) => image,
            Err(e) if !e.is_fatal() => {
                warn!("Program transfer aborted: {}", e);
                self.notice("[ERROR]".red().bold(), &format!("{}; transfer aborted", e))?;
                self.record_event(&format!("transfer aborted: {}", e));
                self.stats.aborted_transfers += 1;
                return Ok(Event::TransferAborted(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        if image.is_empty() {
            self.notice(
                "[WARN]".yellow().bold(),
                "Image is empty; sending the terminator only",
            )?;
        }
        let loading = format!(
            "Loading program of size {} bytes (at least {:.1}s)...",
            image.len(),
            self.protocol.min_transfer_time(image.len()).as_secs_f64()
        );
        self.notice("[TX]".cyan().bold(), &loading)?;

        let report = send_program(&mut self.link, &image, &self.protocol)?;

        let rate = report
            .throughput()
            .map(|r| format!(", {:.0} B/s", r))
            .unwrap_or_default();
        let summary = format!(
            "Program loaded successfully: {} bytes in {:.2}s{}, CRC-32 0x{:08x}",
            report.payload_bytes,
            report.elapsed.as_secs_f64(),
            rate,
            report.checksum
        );
        self.notice("[OK]".green().bold(), &summary)?;
        self.record_event(&summary);

        self.stats.transfers += 1;
        self.stats.bytes_sent += report.payload_bytes;
        Ok(Event::ProgramLoaded(report))
    }

    fn breakpoint(&mut self, text: &str) -> SessionResult<Event> {
        self.record_line(text);
        self.notice("[*]".cyan().bold(), text)?;

        // The device stays halted until `c` arrives, so every command byte
        // goes out before anything is reported.
        let choice = self.operator.breakpoint_choice();
        for command in choice.commands() {
            send_command(&mut self.link, *command)?;
        }
        for command in choice.commands() {
            self.record_event(command.sent_message());
            self.notice("[TX]".cyan().bold(), command.sent_message())?;
        }

        self.stats.breakpoints += 1;
        Ok(Event::BreakpointHandled(choice))
    }

    fn notice(&mut self, tag: colored::ColoredString, message: &str) -> SessionResult<()> {
        writeln!(self.display, "{} {}", tag, message)
            .and_then(|_| self.display.flush())
            .map_err(SessionError::Console)
    }

    fn record_line(&mut self, line: &str) {
        self.record(|transcript| transcript.record_line(line));
    }

    fn record_event(&mut self, event: &str) {
        self.record(|transcript| transcript.record_event(event));
    }

    /// Write to the transcript, dropping it after the first failure
    fn record<F>(&mut self, write: F)
    where
        F: FnOnce(&mut Transcript) -> SessionResult<()>,
    {
        let failed = match self.transcript.as_mut() {
            Some(transcript) => write(transcript).err(),
            None => None,
        };
        let Some(e) = failed else {
            return;
        };
        if let Some(transcript) = self.transcript.take() {
            warn!(
                "{} ({}); continuing without a transcript",
                e,
                transcript.path().display()
            );
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(70).dimmed());
        println!("{}", "--- Session Summary ---".cyan().bold());
        println!("Lines received: {}", self.stats.lines_echoed);
        println!(
            "Programs loaded: {} ({} bytes)",
            self.stats.transfers, self.stats.bytes_sent
        );
        if self.stats.aborted_transfers > 0 {
            println!(
                "Aborted loads: {}",
                self.stats.aborted_transfers.to_string().yellow()
            );
        }
        println!("Breakpoints handled: {}", self.stats.breakpoints);
        let failures = self.reader.decode_failures();
        println!(
            "Undecodable lines: {}",
            if failures > 0 {
                failures.to_string().yellow().to_string()
            } else {
                failures.to_string().green().to_string()
            }
        );
        if let Some(ref transcript) = self.transcript {
            println!("Transcript saved to: {}", transcript.path().display());
        }
        println!("{}", "=".repeat(70).dimmed());
    }
}

#[cfg(test)]
impl<L, O, D> Session<L, O, D> {
    fn state(&self) -> SessionState {
        self.state
    }

    fn stats(&self) -> &SessionStats {
        &self.stats
    }

    fn link(&self) -> &L {
        &self.link
    }

    fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn display(&self) -> &D {
        &self.display
    }

    fn decode_failures(&self) -> usize {
        self.reader.decode_failures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Terminator;
    use crate::serial::mock::{LinkOp, MockLink};
    use std::collections::VecDeque;
    use std::io::Write as _;
    use tempfile::{tempdir, NamedTempFile};

    /// Operator double answering from a script
    #[derive(Default)]
    struct ScriptedOperator {
        paths: VecDeque<String>,
        choices: VecDeque<BreakpointChoice>,
        asked: usize,
    }

    impl ScriptedOperator {
        fn with_path(path: &str) -> Self {
            Self {
                paths: VecDeque::from([path.to_string()]),
                ..Default::default()
            }
        }

        fn with_choice(input: &str) -> Self {
            Self {
                choices: VecDeque::from([BreakpointChoice::parse(input)]),
                ..Default::default()
            }
        }
    }

    impl Operator for ScriptedOperator {
        fn program_path(&mut self) -> String {
            self.asked += 1;
            self.paths.pop_front().unwrap_or_default()
        }

        fn breakpoint_choice(&mut self) -> BreakpointChoice {
            self.asked += 1;
            self.choices.pop_front().unwrap_or_default()
        }
    }

    fn session(
        input: &[u8],
        operator: ScriptedOperator,
    ) -> Session<MockLink, ScriptedOperator, Vec<u8>> {
        Session::new(MockLink::new(input), operator, Vec::new(), ProtocolConfig::new())
    }

    fn shown(session: &Session<MockLink, ScriptedOperator, Vec<u8>>) -> String {
        String::from_utf8(session.display().clone()).unwrap()
    }

    fn program_file(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_plain_output_is_echoed_without_writes() {
        let mut s = session(b"Hello, UART!\nload program\n", ScriptedOperator::default());

        assert_eq!(s.step().unwrap(), Event::Echoed("Hello, UART!".into()));
        assert_eq!(s.step().unwrap(), Event::Echoed("load program".into()));

        assert_eq!(shown(&s), "Hello, UART!\nload program\n");
        assert!(s.link().ops().is_empty());
        assert_eq!(s.operator.asked, 0);
        assert_eq!(s.stats().lines_echoed, 2);
    }

    #[test]
    fn test_blank_lines_then_hello() {
        let mut s = session(b"\n  \r\nhello\n", ScriptedOperator::default());

        assert_eq!(s.step().unwrap(), Event::Quiet);
        assert_eq!(s.step().unwrap(), Event::Quiet);
        assert_eq!(s.step().unwrap(), Event::Echoed("hello".into()));
        assert_eq!(s.step().unwrap(), Event::Quiet);

        assert_eq!(shown(&s), "hello\n");
        assert!(s.link().ops().is_empty());
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_load_program_scenario() {
        let file = program_file(&[0x01, 0x02, 0x03]);
        let operator = ScriptedOperator::with_path(file.path().to_str().unwrap());
        let mut s = session(b"Load program\n", operator);

        let event = s.step().unwrap();
        let Event::ProgramLoaded(report) = event else {
            panic!("expected a transfer, got {:?}", event);
        };
        assert_eq!(report.payload_bytes, 3);

        assert_eq!(
            s.link().written(),
            vec![0x01, 0x02, 0x03, 0xff, 0xff, 0xff, 0xff]
        );
        // Settle, drain, 7 paced bytes, flush, drain
        assert_eq!(s.link().ops().len(), 2 + 7 * 2 + 2);
        assert!(shown(&s).contains("Program load request detected."));
        assert!(shown(&s).contains("Program loaded successfully: 3 bytes"));
        assert_eq!(s.stats().transfers, 1);
        assert_eq!(s.stats().bytes_sent, 3);
    }

    #[test]
    fn test_load_program_with_imdone() {
        let file = program_file(b"\x7f\x00");
        let operator = ScriptedOperator::with_path(file.path().to_str().unwrap());
        let protocol = ProtocolConfig::new().with_terminator(Terminator::ImDone);
        let mut s = Session::new(MockLink::new(b"Load program v2\n"), operator, Vec::new(), protocol);

        s.step().unwrap();
        assert_eq!(s.link().written(), b"\x7f\x00IMDONE");
    }

    #[test]
    fn test_missing_image_aborts_without_writes() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.bin");
        let operator = ScriptedOperator::with_path(missing.to_str().unwrap());
        let mut s = session(b"Load program\nafter\n", operator);

        assert!(matches!(s.step().unwrap(), Event::TransferAborted(_)));
        assert!(s.link().ops().is_empty());
        assert_eq!(s.stats().aborted_transfers, 1);

        // Back in the read loop
        assert_eq!(s.step().unwrap(), Event::Echoed("after".into()));
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_breakpoint_dump_sends_d_then_c() {
        let mut s = session(b"Breakpoint at 0x4000\n", ScriptedOperator::with_choice("d"));

        assert_eq!(
            s.step().unwrap(),
            Event::BreakpointHandled(BreakpointChoice::Dump)
        );
        assert_eq!(s.link().written(), b"dc");

        let out = shown(&s);
        let dump = out.find("Memory dump command sent.").unwrap();
        let cont = out.find("Continue command sent.").unwrap();
        assert!(dump < cont);
    }

    #[test]
    fn test_breakpoint_other_input_continues() {
        for input in ["c", "", "x", "continue"] {
            let mut s = session(b"Breakpoint\n", ScriptedOperator::with_choice(input));
            assert_eq!(
                s.step().unwrap(),
                Event::BreakpointHandled(BreakpointChoice::Continue)
            );
            assert_eq!(s.link().written(), b"c", "input {:?}", input);
        }
    }

    #[test]
    fn test_breakpoint_does_not_wait_for_ack() {
        let mut s = session(b"Breakpoint\n", ScriptedOperator::with_choice("c"));
        s.step().unwrap();
        assert_eq!(
            s.link().ops(),
            &[LinkOp::Write(vec![b'c']), LinkOp::Flush]
        );
    }

    #[test]
    fn test_decode_failure_does_not_end_session() {
        let mut s = session(b"\xc3\x28oops\nfine\n", ScriptedOperator::default());

        assert_eq!(s.step().unwrap(), Event::Quiet);
        assert_eq!(s.step().unwrap(), Event::Echoed("fine".into()));
        assert_eq!(s.decode_failures(), 1);
    }

    #[test]
    fn test_connection_lost_ends_run() {
        let link = MockLink::new(b"hello\n").hang_up_when_drained();
        let mut s = Session::new(
            link,
            ScriptedOperator::default(),
            Vec::new(),
            ProtocolConfig::new(),
        );

        let err = s.run();
        assert!(matches!(err, SessionError::ConnectionLost(_)));
        assert_eq!(shown(&s), "hello\n");
    }

    #[test]
    fn test_write_failure_during_transfer_is_fatal() {
        let file = program_file(&[1, 2, 3]);
        let operator = ScriptedOperator::with_path(file.path().to_str().unwrap());
        let link = MockLink::new(b"Load program\n").failing_writes();
        let mut s = Session::new(link, operator, Vec::new(), ProtocolConfig::new());

        let err = s.step().unwrap_err();
        assert!(matches!(err, SessionError::ConnectionLost(_)));
    }

    #[test]
    fn test_stale_input_is_drained_before_transfer() {
        let file = program_file(&[0x42]);
        let operator = ScriptedOperator::with_path(file.path().to_str().unwrap());
        let mut s = session(b"Load program\n", operator);
        // Bytes the device queued right after its request
        s.link_mut().feed(b"junk\n");

        s.step().unwrap();
        assert_eq!(s.link().pending_input(), 0);
        assert_eq!(s.step().unwrap(), Event::Quiet);
    }

    #[test]
    fn test_transcript_records_session() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("session.log");
        let transcript = Transcript::create(&log_path).unwrap();
        let mut s = session(
            b"boot ok\nBreakpoint at 0x10\n",
            ScriptedOperator::with_choice("d"),
        )
        .with_transcript(transcript);

        s.step().unwrap();
        s.step().unwrap();

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("] boot ok"));
        assert!(log.contains("] Breakpoint at 0x10"));
        assert!(log.contains(">> Memory dump command sent."));
        assert!(log.contains(">> Continue command sent."));
    }

    #[test]
    fn test_transcript_records_load_request_line() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("session.log");
        let missing = dir.path().join("missing.bin");
        let operator = ScriptedOperator::with_path(missing.to_str().unwrap());
        let mut s = session(b"Load program (v2)\n", operator)
            .with_transcript(Transcript::create(&log_path).unwrap());

        s.step().unwrap();

        let log = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert!(lines[0].ends_with("] Load program (v2)"));
        assert!(lines[1].ends_with("] >> program load request"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_transcript_write_failure_keeps_session_alive() {
        let transcript = Transcript::create(std::path::Path::new("/dev/full")).unwrap();
        let mut s = session(b"hello\nworld\n", ScriptedOperator::default())
            .with_transcript(transcript);

        assert_eq!(s.step().unwrap(), Event::Echoed("hello".into()));
        assert!(s.transcript.is_none());
        assert_eq!(s.step().unwrap(), Event::Echoed("world".into()));
        assert_eq!(shown(&s), "hello\nworld\n");
    }

    /// Display that stops accepting output after its first flush
    #[derive(Default)]
    struct BrokenDisplay {
        flushed: bool,
    }

    impl std::io::Write for BrokenDisplay {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.flushed {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    #[test]
    fn test_breakpoint_commands_sent_before_display_fails() {
        let mut s = Session::new(
            MockLink::new(b"Breakpoint at 0x20\n"),
            ScriptedOperator::with_choice("d"),
            BrokenDisplay::default(),
            ProtocolConfig::new(),
        );

        let err = s.step().unwrap_err();
        assert!(matches!(err, SessionError::Console(_)));
        assert_eq!(s.link().written(), b"dc");
    }
}
