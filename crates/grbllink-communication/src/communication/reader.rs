//! Background line reader
//!
//! Owns the read half of the port on a dedicated thread. Complete lines are
//! forwarded in arrival order over an unbounded channel; the session drains
//! them on its own schedule. After repeated disconnect faults the reader
//! sends a single [`ReaderMessage::Disconnected`] and exits.

use super::fault::{classify_io_error, DisconnectDebounce};
use super::PortReader;
use grbllink_core::{ConnectionError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;

/// Pause after a failed read before trying again
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// What the reader forwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderMessage {
    /// One received line, trimmed, never empty
    Line(String),
    /// The transport is gone; always the last message
    Disconnected(String),
}

/// Handle to the reader thread
pub struct Reader {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Reader {
    /// Start reading on a new thread
    pub fn spawn(
        port: Box<dyn PortReader>,
        tx: mpsc::UnboundedSender<ReaderMessage>,
        idle: Duration,
        disconnect_threshold: u32,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let worker = ReadLoop {
            port,
            tx,
            stop: Arc::clone(&stop),
            idle,
            debounce: DisconnectDebounce::new(disconnect_threshold),
            partial: Vec::new(),
        };

        let handle = thread::Builder::new()
            .name("grbl-reader".to_string())
            .spawn(move || worker.run())
            .map_err(|e| ConnectionError::IoError {
                reason: format!("failed to start reader thread: {}", e),
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the thread to stop and wait for it
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("reader thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReadLoop {
    port: Box<dyn PortReader>,
    tx: mpsc::UnboundedSender<ReaderMessage>,
    stop: Arc<AtomicBool>,
    idle: Duration,
    debounce: DisconnectDebounce,
    partial: Vec<u8>,
}

impl ReadLoop {
    fn run(mut self) {
        tracing::debug!("reader started");
        let mut buf = [0u8; 1024];

        while !self.stop.load(Ordering::SeqCst) {
            let result = self.port.bytes_to_read().and_then(|available| {
                if available == 0 {
                    return Ok(0);
                }
                let len = available.min(buf.len());
                self.port.read(&mut buf[..len])
            });

            match result {
                Ok(0) => {
                    self.debounce.record_success();
                    thread::sleep(self.idle);
                }
                Ok(n) => {
                    self.debounce.record_success();
                    if !self.forward(&buf[..n]) {
                        break;
                    }
                }
                Err(err) => {
                    let fault = classify_io_error(&err);
                    tracing::debug!(?fault, "read error: {}", err);
                    if self.debounce.record(fault) {
                        tracing::warn!("serial link lost: {}", err);
                        let _ = self.tx.send(ReaderMessage::Disconnected(err.to_string()));
                        break;
                    }
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        tracing::debug!("reader stopped");
    }

    /// Split complete lines out of the buffer; `false` if the session is gone
    fn forward(&mut self, bytes: &[u8]) -> bool {
        self.partial.extend_from_slice(bytes);
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if self.tx.send(ReaderMessage::Line(line.to_string())).is_err() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Scripted read results, one per call
    struct ScriptedReader {
        script: VecDeque<io::Result<Vec<u8>>>,
        current: Option<Vec<u8>>,
    }

    impl ScriptedReader {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                script: script.into(),
                current: None,
            }
        }
    }

    impl PortReader for ScriptedReader {
        fn bytes_to_read(&mut self) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(bytes)) => {
                    let len = bytes.len();
                    self.current = Some(bytes);
                    Ok(len)
                }
                Some(Err(err)) => Err(err),
                None => Ok(0),
            }
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let bytes = self.current.take().unwrap_or_default();
            buf[..bytes.len()].copy_from_slice(&bytes);
            Ok(bytes.len())
        }
    }

    fn collect(rx: &mut mpsc::UnboundedReceiver<ReaderMessage>, count: usize) -> Vec<ReaderMessage> {
        let mut messages = Vec::new();
        for _ in 0..500 {
            while let Ok(message) = rx.try_recv() {
                messages.push(message);
            }
            if messages.len() >= count {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        messages
    }

    #[test]
    fn test_splits_lines_across_reads() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let port = ScriptedReader::new(vec![
            Ok(b"o".to_vec()),
            Ok(b"k\r\n<Idle|MPos:0,0,0>\r".to_vec()),
            Ok(b"\n\r\nerror:\xff20\n".to_vec()),
        ]);
        let mut reader = Reader::spawn(Box::new(port), tx, Duration::from_millis(1), 3).unwrap();

        let messages = collect(&mut rx, 3);
        reader.stop();
        assert_eq!(messages[0], ReaderMessage::Line("ok".to_string()));
        assert_eq!(messages[1], ReaderMessage::Line("<Idle|MPos:0,0,0>".to_string()));
        assert_eq!(
            messages[2],
            ReaderMessage::Line("error:\u{fffd}20".to_string())
        );
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn test_disconnect_after_three_faults() {
        let fault = || Err(io::Error::other("Input/output error"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let port = ScriptedReader::new(vec![
            fault(),
            fault(),
            Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
            Ok(b"ok\n".to_vec()),
            fault(),
            fault(),
            fault(),
        ]);
        let mut reader = Reader::spawn(Box::new(port), tx, Duration::from_millis(1), 3).unwrap();

        let messages = collect(&mut rx, 2);
        assert_eq!(messages[0], ReaderMessage::Line("ok".to_string()));
        assert!(matches!(messages[1], ReaderMessage::Disconnected(_)));
        assert_eq!(messages.len(), 2);

        reader.stop();
        assert!(!reader.is_running());
    }
}
