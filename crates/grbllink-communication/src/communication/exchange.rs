//! Synchronous request/response
//!
//! Writes one line and collects everything the controller answers until the
//! terminating `ok` or error. Used for one-off queries outside a streaming
//! session, where no reader thread owns the port.

use super::{PortReader, PortWriter};
use crate::firmware::grbl::GrblResponse;
use grbllink_core::{ConnectionError, ControllerError, Result};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Send `command` and return every line received up to and including the
/// terminating response
pub fn blocking_exchange(
    reader: &mut dyn PortReader,
    writer: &mut dyn PortWriter,
    command: &str,
    timeout: Duration,
) -> Result<Vec<String>> {
    let io_error = |e: std::io::Error| ConnectionError::IoError {
        reason: e.to_string(),
    };

    writer
        .write_all(format!("{}\n", command.trim()).as_bytes())
        .map_err(io_error)?;
    tracing::debug!(command, "exchange sent");

    let deadline = Instant::now() + timeout;
    let mut lines = Vec::new();
    let mut partial = Vec::new();
    let mut buf = [0u8; 256];

    while Instant::now() < deadline {
        let available = reader.bytes_to_read().map_err(io_error)?;
        if available == 0 {
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }
        let len = available.min(buf.len());
        let n = reader.read(&mut buf[..len]).map_err(io_error)?;
        partial.extend_from_slice(&buf[..n]);

        while let Some(pos) = partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = partial.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            let Some(response) = GrblResponse::parse(&line) else {
                continue;
            };
            let done = response.frees_slot() || matches!(response, GrblResponse::Alarm(_));
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    Err(ControllerError::Timeout {
        timeout_ms: timeout.as_millis() as u64,
    }
    .into())
}
