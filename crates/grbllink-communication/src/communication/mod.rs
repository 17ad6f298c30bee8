//! Transport layer
//!
//! A transport opens a port and hands back two halves: the read half goes
//! to the reader thread, the write half stays with the session. Serial
//! hardware and the in-memory virtual port both implement [`Transport`].

pub mod exchange;
pub mod fault;
pub mod reader;
pub mod serial;
pub mod virtual_port;

use grbllink_core::Result;
use grbllink_settings::ConnectionSettings;
use std::io;
use std::time::Duration;

pub use exchange::blocking_exchange;
pub use fault::{classify_io_error, DisconnectDebounce, IoFault};
pub use reader::{Reader, ReaderMessage};
pub use serial::{list_ports, SerialPortInfo, SerialTransport};
pub use virtual_port::VirtualPort;

/// Parameters for opening a port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Port name
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read/write timeout
    pub timeout: Duration,
}

impl ConnectionParams {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            timeout: Duration::from_secs(2),
        }
    }
}

impl From<&ConnectionSettings> for ConnectionParams {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            port: settings.port.clone(),
            baud_rate: settings.baud_rate,
            timeout: settings.timeout(),
        }
    }
}

/// Read half of an open port
pub trait PortReader: Send {
    /// Bytes available without blocking
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    /// Read available bytes into `buf`
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Write half of an open port
pub trait PortWriter: Send {
    /// Write all of `data`
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Drop anything received but not yet read
    fn discard_input(&mut self) -> io::Result<()>;

    /// Release the port; calling it again is a no-op
    fn close(&mut self);
}

/// Both halves of an open port
pub struct PortPair {
    pub reader: Box<dyn PortReader>,
    pub writer: Box<dyn PortWriter>,
}

/// Something that can open ports
pub trait Transport: Send {
    fn open(&self, params: &ConnectionParams) -> Result<PortPair>;
}
