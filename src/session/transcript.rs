//! Session transcript file
//!
//! Device output and handshake events, one timestamped entry per line.

use crate::error::{SessionError, SessionResult};
use chrono::Local;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct Transcript {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Transcript {
    /// Create (or truncate) the transcript file
    pub fn create(path: &Path) -> SessionResult<Self> {
        let file = File::create(path).map_err(SessionError::Transcript)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a line of device output
    pub fn record_line(&mut self, line: &str) -> SessionResult<()> {
        self.write_entry("", line)
    }

    /// Record something the host did
    pub fn record_event(&mut self, event: &str) -> SessionResult<()> {
        self.write_entry(">> ", event)
    }

    fn write_entry(&mut self, marker: &str, text: &str) -> SessionResult<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        writeln!(self.writer, "[{}] {}{}", timestamp, marker, text)
            .and_then(|_| self.writer.flush())
            .map_err(SessionError::Transcript)
    }
}
