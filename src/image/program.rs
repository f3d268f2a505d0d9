//! Program images sent to the processor
//!
//! An image is an opaque byte blob. The host never interprets it beyond a
//! few sanity notes shown by `image inspect`.

use crate::error::{SessionError, SessionResult};
use crate::protocol::ProtocolConfig;
use colored::Colorize;
use crc::{Crc, CRC_32_ISO_HDLC};
use std::fs;
use std::io;
use std::path::Path;

/// CRC-32 used for image checksums (same as zlib / Ethernet)
pub const IMAGE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// A program image loaded fully into memory
#[derive(Debug, Clone)]
pub struct ProgramImage {
    path: String,
    bytes: Vec<u8>,
}

/// Something worth telling the operator about an image
#[derive(Debug, Clone, PartialEq)]
pub enum ImageIssue {
    /// Nothing to send but the terminator
    Empty,
    /// The payload contains the terminator at this offset
    ContainsTerminator(usize),
    /// The file is an ELF object rather than a raw binary
    ElfObject,
}

impl std::fmt::Display for ImageIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageIssue::Empty => write!(f, "Image is empty; only the terminator would be sent"),
            ImageIssue::ContainsTerminator(offset) => write!(
                f,
                "Terminator sequence appears in the payload at offset 0x{:x}; the device will stop early",
                offset
            ),
            ImageIssue::ElfObject => write!(
                f,
                "ELF object detected; the loader expects a raw binary (objcopy -O binary)"
            ),
        }
    }
}

impl ProgramImage {
    /// Read a whole image from disk
    pub fn load(path: &str) -> SessionResult<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(SessionError::FileNotFound {
                path: String::new(),
            });
        }

        let bytes = fs::read(Path::new(trimmed)).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SessionError::FileNotFound {
                path: trimmed.to_string(),
            },
            _ => SessionError::ReadError {
                path: trimmed.to_string(),
                source,
            },
        })?;

        Ok(Self {
            path: trimmed.to_string(),
            bytes,
        })
    }

    /// Wrap bytes already in memory
    #[cfg(test)]
    pub fn from_bytes(path: &str, bytes: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            bytes,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// CRC-32 of the payload
    pub fn checksum(&self) -> u32 {
        IMAGE_CRC.checksum(&self.bytes)
    }

    /// Sanity notes for sending this image under the given protocol
    pub fn issues(&self, protocol: &ProtocolConfig) -> Vec<ImageIssue> {
        let mut issues = Vec::new();

        if self.bytes.is_empty() {
            issues.push(ImageIssue::Empty);
        }

        let marker = protocol.terminator.bytes();
        if let Some(offset) = self
            .bytes
            .windows(marker.len())
            .position(|window| window == marker)
        {
            issues.push(ImageIssue::ContainsTerminator(offset));
        }

        if self.bytes.starts_with(&ELF_MAGIC) {
            issues.push(ImageIssue::ElfObject);
        }

        issues
    }

    /// Print inspection report
    pub fn print_report(&self, protocol: &ProtocolConfig, preview: usize) {
        println!("{}", "=".repeat(70));
        println!("{}", "Program Image".cyan().bold());
        println!("{}", "=".repeat(70));

        println!("\n{}: {}", "File".white().bold(), self.path);
        println!(
            "{}: {} bytes ({})",
            "Size".white().bold(),
            self.len(),
            format_size(self.len() as u64)
        );
        println!(
            "{}: {}",
            "CRC-32".white().bold(),
            format!("0x{:08x}", self.checksum()).cyan()
        );

        println!("\n{}", "Transfer:".white().bold());
        println!("  Terminator: {}", protocol.terminator.to_string().cyan());
        println!("  Pacing: {}", protocol.pacing.to_string().cyan());
        println!(
            "  Bytes on the wire: {}",
            self.len() + protocol.terminator.bytes().len()
        );
        println!(
            "  Minimum duration: {:.2}s",
            protocol.min_transfer_time(self.len()).as_secs_f64()
        );

        let issues = self.issues(protocol);
        if !issues.is_empty() {
            println!("\n{}", "Notes:".white().bold());
            for issue in &issues {
                println!("  {} {}", "[WARNING]".yellow().bold(), issue);
            }
        }

        if preview > 0 && !self.bytes.is_empty() {
            let shown = preview.min(self.bytes.len());
            println!("\n{} (first {} bytes)", "Preview".white().bold(), shown);
            hexdump::hexdump(&self.bytes[..shown]);
        }

        println!("\n{}", "=".repeat(70));
    }
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
