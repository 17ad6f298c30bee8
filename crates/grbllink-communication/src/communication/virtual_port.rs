//! In-memory transport
//!
//! A `VirtualPort` stands in for serial hardware. Clones share state, so a
//! test keeps one clone to script responses and inspect writes while the
//! session owns the port halves. With the simulator enabled it answers like
//! an idle GRBL: `ok` for every line, a status report for `?` and a banner
//! after a soft reset.

use super::{ConnectionParams, PortPair, PortReader, PortWriter, Transport};
use crate::firmware::grbl::realtime;
use crate::gcode::ModalTracker;
use grbllink_core::{ConnectionError, Position, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

const BANNER: &str = "Grbl 1.1h ['$' for help]";

/// Settings reported by the simulator for `$$`
const SIMULATED_SETTINGS: &[(u16, &str)] = &[
    (10, "1"),
    (22, "1"),
    (32, "1"),
    (110, "5000.000"),
    (111, "5000.000"),
    (130, "400.000"),
    (131, "400.000"),
];

#[derive(Default)]
struct Simulator {
    modal: ModalTracker,
    offset: Position,
}

impl Simulator {
    fn status(&self) -> String {
        let mpos = self.modal.position() + self.offset;
        format!(
            "<Idle|MPos:{:.3},{:.3},{:.3}|FS:0,0|WCO:{:.3},{:.3},{:.3}>",
            mpos.x, mpos.y, mpos.z, self.offset.x, self.offset.y, self.offset.z
        )
    }
}

#[derive(Default)]
struct PortState {
    open: bool,
    inbound: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    read_faults: VecDeque<(io::ErrorKind, String)>,
    write_faults: VecDeque<(io::ErrorKind, String)>,
    open_error: Option<String>,
    open_count: usize,
    simulator: Option<Simulator>,
    line_buffer: Vec<u8>,
}

impl PortState {
    fn push_line(&mut self, line: &str) {
        self.inbound.extend(line.as_bytes());
        self.inbound.extend(b"\r\n");
    }

    fn simulate(&mut self, data: &[u8]) {
        let Some(mut sim) = self.simulator.take() else {
            return;
        };
        for &byte in data {
            match byte {
                realtime::STATUS_QUERY => {
                    let status = sim.status();
                    self.push_line(&status);
                }
                realtime::SOFT_RESET => {
                    self.line_buffer.clear();
                    sim.modal.reset_modes();
                    self.push_line("");
                    self.push_line(BANNER);
                }
                realtime::FEED_HOLD | realtime::CYCLE_RESUME => {}
                b'\n' => {
                    let line = String::from_utf8_lossy(&self.line_buffer).trim().to_string();
                    self.line_buffer.clear();
                    self.answer(&mut sim, &line);
                }
                b'\r' => {}
                other => self.line_buffer.push(other),
            }
        }
        self.simulator = Some(sim);
    }

    fn answer(&mut self, sim: &mut Simulator, line: &str) {
        if line.is_empty() {
            return;
        }
        if line == "$$" {
            for (number, value) in SIMULATED_SETTINGS {
                self.push_line(&format!("${}={}", number, value));
            }
        } else if line.starts_with("G10") && line.contains("L20") {
            let machine = sim.modal.position() + sim.offset;
            sim.modal.apply_line(line);
            sim.offset = machine - sim.modal.position();
        } else {
            sim.modal.apply_line(line);
        }
        self.push_line("ok");
    }
}

/// In-memory port; clones share one state
#[derive(Clone, Default)]
pub struct VirtualPort {
    state: Arc<Mutex<PortState>>,
}

impl VirtualPort {
    /// Scripted port: nothing is answered unless pushed
    pub fn new() -> Self {
        Self::default()
    }

    /// Port that behaves like an idle GRBL controller
    pub fn simulated() -> Self {
        let port = Self::new();
        port.state.lock().simulator = Some(Simulator::default());
        port
    }

    /// Queue a line for the session to read
    pub fn push_response(&self, line: &str) {
        self.state.lock().push_line(line);
    }

    /// Queue raw bytes for the session to read
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state.lock().inbound.extend(bytes);
    }

    /// Make the next read fail
    pub fn fail_next_read(&self, kind: io::ErrorKind, message: &str) {
        self.state
            .lock()
            .read_faults
            .push_back((kind, message.to_string()));
    }

    /// Make the next write fail
    pub fn fail_next_write(&self, kind: io::ErrorKind, message: &str) {
        self.state
            .lock()
            .write_faults
            .push_back((kind, message.to_string()));
    }

    /// Make every following operation fail as if the adapter was unplugged
    pub fn unplug(&self) {
        self.state.lock().open = false;
    }

    /// Make the next `open` fail
    pub fn refuse_open(&self, reason: &str) {
        self.state.lock().open_error = Some(reason.to_string());
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Every write, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// Newline-terminated writes, without terminator
    pub fn sent_lines(&self) -> Vec<String> {
        self.writes()
            .iter()
            .filter(|w| w.ends_with(b"\n"))
            .map(|w| String::from_utf8_lossy(w).trim_end().to_string())
            .collect()
    }

    /// Single-byte realtime writes
    pub fn realtime_bytes(&self) -> Vec<u8> {
        self.writes()
            .iter()
            .filter(|w| w.len() == 1 && w[0] != b'\n')
            .map(|w| w[0])
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Bytes queued but not yet read
    pub fn unread(&self) -> usize {
        self.state.lock().inbound.len()
    }
}

impl Transport for VirtualPort {
    fn open(&self, params: &ConnectionParams) -> Result<PortPair> {
        let mut state = self.state.lock();
        if let Some(reason) = state.open_error.take() {
            return Err(ConnectionError::FailedToOpen {
                port: params.port.clone(),
                reason,
            }
            .into());
        }
        state.open = true;
        state.open_count += 1;
        if state.simulator.is_some() {
            state.push_line(BANNER);
        }
        drop(state);

        Ok(PortPair {
            reader: Box::new(VirtualReader {
                state: Arc::clone(&self.state),
            }),
            writer: Box::new(VirtualWriter {
                state: Arc::clone(&self.state),
                closed: false,
            }),
        })
    }
}

fn not_open() -> io::Error {
    io::Error::other("device is not open")
}

struct VirtualReader {
    state: Arc<Mutex<PortState>>,
}

impl PortReader for VirtualReader {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        let mut state = self.state.lock();
        if let Some((kind, message)) = state.read_faults.pop_front() {
            return Err(io::Error::new(kind, message));
        }
        if !state.open {
            return Err(not_open());
        }
        Ok(state.inbound.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let len = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

struct VirtualWriter {
    state: Arc<Mutex<PortState>>,
    closed: bool,
}

impl PortWriter for VirtualWriter {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if let Some((kind, message)) = state.write_faults.pop_front() {
            return Err(io::Error::new(kind, message));
        }
        if self.closed || !state.open {
            return Err(not_open());
        }
        state.writes.push(data.to_vec());
        state.simulate(data);
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.state.lock().inbound.clear();
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(reader: &mut dyn PortReader) -> String {
        let mut buf = [0u8; 512];
        let n = reader.bytes_to_read().unwrap();
        let n = reader.read(&mut buf[..n]).unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    }

    #[test]
    fn test_scripted_port() {
        let port = VirtualPort::new();
        let mut pair = port.open(&ConnectionParams::new("virtual", 115200)).unwrap();
        port.push_response("ok");
        assert_eq!(read_all(pair.reader.as_mut()), "ok\r\n");

        pair.writer.write_all(b"G0 X1\n").unwrap();
        pair.writer.write_all(b"?").unwrap();
        assert_eq!(port.sent_lines(), vec!["G0 X1"]);
        assert_eq!(port.realtime_bytes(), vec![b'?']);
    }

    #[test]
    fn test_simulator_answers() {
        let port = VirtualPort::simulated();
        let mut pair = port.open(&ConnectionParams::new("sim", 115200)).unwrap();
        pair.writer.discard_input().unwrap();

        pair.writer.write_all(b"G0 X5 Y2\n").unwrap();
        pair.writer.write_all(b"?").unwrap();
        let text = read_all(pair.reader.as_mut());
        assert!(text.starts_with("ok\r\n<Idle|MPos:5.000,2.000,0.000|"));

        pair.writer.write_all(b"G10 L20 P1 X0 Y0 Z0\n").unwrap();
        pair.writer.write_all(b"?").unwrap();
        let text = read_all(pair.reader.as_mut());
        assert!(text.contains("MPos:5.000,2.000,0.000|FS:0,0|WCO:5.000,2.000,0.000"));
    }

    #[test]
    fn test_close_and_unplug() {
        let port = VirtualPort::new();
        let mut pair = port.open(&ConnectionParams::new("virtual", 115200)).unwrap();
        pair.writer.close();
        pair.writer.close();
        assert!(!port.is_open());
        assert!(pair.writer.write_all(b"?").is_err());
        assert!(pair.reader.bytes_to_read().is_err());
    }

    #[test]
    fn test_raw_bytes_and_unplug() {
        let port = VirtualPort::new();
        let mut pair = port.open(&ConnectionParams::new("virtual", 115200)).unwrap();
        port.push_bytes(b"o");
        port.push_bytes(b"k\r\n");
        assert_eq!(port.unread(), 4);
        assert_eq!(read_all(pair.reader.as_mut()), "ok\r\n");
        assert_eq!(port.unread(), 0);

        port.unplug();
        assert!(pair.reader.bytes_to_read().is_err());
        assert!(pair.writer.write_all(b"?").is_err());
    }

    #[test]
    fn test_refused_open() {
        let port = VirtualPort::new();
        port.refuse_open("busy");
        assert!(port.open(&ConnectionParams::new("virtual", 115200)).is_err());
        assert!(port.open(&ConnectionParams::new("virtual", 115200)).is_ok());
        assert_eq!(port.open_count(), 1);
    }
}
