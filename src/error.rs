//! Error kinds for a terminal session
//!
//! Only connection-level failures end a session. Everything the operator can
//! fix by trying again (a mistyped path, an unreadable file) is recoverable
//! and the dispatcher goes back to reading lines.

use std::io;
use thiserror::Error;

/// Errors raised while talking to the device or the operator
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading or writing the serial connection failed
    #[error("connection lost: {0}")]
    ConnectionLost(#[source] io::Error),

    /// The requested program image does not exist
    #[error("program image not found: {path}")]
    FileNotFound { path: String },

    /// The requested program image exists but could not be read
    #[error("failed to read program image {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Port index or baud rate could not be understood
    #[error("invalid input: {0}")]
    InvalidOperatorInput(String),

    /// The operator display could not be written
    #[error("console output failed: {0}")]
    Console(#[source] io::Error),

    /// The session transcript could not be created or written
    ///
    /// Only fatal when the file cannot be created at startup; a write that
    /// fails mid-session disables the transcript instead.
    #[error("transcript failed: {0}")]
    Transcript(#[source] io::Error),
}

impl SessionError {
    /// Whether this error ends the session
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SessionError::FileNotFound { .. } | SessionError::ReadError { .. }
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        let lost = SessionError::ConnectionLost(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(lost.is_fatal());
        assert!(SessionError::InvalidOperatorInput("x".into()).is_fatal());

        let missing = SessionError::FileNotFound {
            path: "prog.bin".into(),
        };
        assert!(!missing.is_fatal());
        assert_eq!(missing.to_string(), "program image not found: prog.bin");
    }
}
