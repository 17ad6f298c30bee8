//! Serial port transport
//!
//! Opens a port with the `serialport` crate and splits it into a read half
//! for the reader thread and a write half for the session, using
//! `try_clone` so both sides share one OS handle.
//!
//! Also provides port enumeration filtered to the device names CNC
//! controllers usually appear under.

use super::{ConnectionParams, PortPair, PortReader, PortWriter, Transport};
use grbllink_core::{ConnectionError, Result};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            vid: None,
            pid: None,
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List serial ports that look like CNC controllers
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::IoError {
            reason: format!("failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_cnc_port_name(&port.port_name))
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, port_description(port));
            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    let info = info.with_usb_ids(usb.vid, usb.pid);
                    match &usb.manufacturer {
                        Some(manufacturer) => info.with_manufacturer(manufacturer),
                        None => info,
                    }
                }
                _ => info,
            }
        })
        .collect())
}

/// Windows `COMn`, Linux `ttyUSB`/`ttyACM`, macOS `cu.usbserial`/`cu.usbmodem`
pub fn is_cnc_port_name(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }
    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Opens real serial hardware, 8N1 without flow control
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialTransport;

impl Transport for SerialTransport {
    fn open(&self, params: &ConnectionParams) -> Result<PortPair> {
        let failed = |e: &dyn std::fmt::Display| ConnectionError::FailedToOpen {
            port: params.port.clone(),
            reason: e.to_string(),
        };

        if params.port.is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "no port given".to_string(),
            }
            .into());
        }

        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(params.timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                failed(&e)
            })?;

        let reader = port.try_clone().map_err(|e| failed(&e))?;
        tracing::info!(port = %params.port, baud = params.baud_rate, "serial port opened");

        Ok(PortPair {
            reader: Box::new(SerialReader { port: reader }),
            writer: Box::new(SerialWriter { port: Some(port) }),
        })
    }
}

struct SerialReader {
    port: Box<dyn SerialPort>,
}

impl PortReader for SerialReader {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

struct SerialWriter {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialWriter {
    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "device is not open"))
    }
}

impl PortWriter for SerialWriter {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::debug!("serial port closed");
        }
    }
}
