//! Program transfer
//!
//! Answers a `Load program` request: drain stale input, stream the image,
//! close it with the terminator, then drop whatever the device echoed back.
//! Nothing else is written to the link between the first payload byte and
//! the last terminator byte.

use super::{Pacing, ProtocolConfig, Terminator};
use crate::error::{SessionError, SessionResult};
use crate::image::ProgramImage;
use crate::serial::DeviceLink;
use log::{debug, info};
use std::time::{Duration, Instant};

/// Outcome of a completed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReport {
    /// Payload bytes written, terminator excluded
    pub payload_bytes: usize,
    pub terminator: Terminator,
    pub elapsed: Duration,
    /// CRC-32 of the payload
    pub checksum: u32,
}

impl TransferReport {
    /// Payload bytes per second, when the elapsed time is measurable
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.payload_bytes as f64 / secs)
    }
}

/// Stream a program image to the device
///
/// Any write failure is `ConnectionLost`; a transfer is never resumed.
pub fn send_program<L: DeviceLink + ?Sized>(
    link: &mut L,
    image: &ProgramImage,
    protocol: &ProtocolConfig,
) -> SessionResult<TransferReport> {
    let started = Instant::now();

    // Stale bytes queued before the request must not look like a reply later
    link.pause(protocol.settle_delay);
    link.discard_input().map_err(SessionError::ConnectionLost)?;

    info!(
        "Sending {} bytes from {} ({}, terminator {})",
        image.len(),
        image.path(),
        protocol.pacing,
        protocol.terminator
    );

    write_paced(link, image.bytes(), protocol.pacing)?;
    write_paced(link, protocol.terminator.bytes(), protocol.pacing)?;
    link.flush().map_err(SessionError::ConnectionLost)?;

    // Per-byte acknowledgements are not checked
    link.discard_input().map_err(SessionError::ConnectionLost)?;

    let report = TransferReport {
        payload_bytes: image.len(),
        terminator: protocol.terminator,
        elapsed: started.elapsed(),
        checksum: image.checksum(),
    };
    debug!("Transfer finished: {:?}", report);
    Ok(report)
}

fn write_paced<L: DeviceLink + ?Sized>(
    link: &mut L,
    bytes: &[u8],
    pacing: Pacing,
) -> SessionResult<()> {
    match pacing.per_byte_delay() {
        None => link.write_all(bytes).map_err(SessionError::ConnectionLost),
        Some(delay) => {
            for byte in bytes {
                link.write_all(std::slice::from_ref(byte))
                    .map_err(SessionError::ConnectionLost)?;
                link.pause(delay);
            }
            Ok(())
        }
    }
}
