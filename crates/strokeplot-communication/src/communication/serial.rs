//! Serial port transport
//!
//! Provides port discovery and a line-oriented transport over a USB or RS-232
//! serial link. Reads use a short port timeout and are polled until the
//! caller's deadline, so a silent controller never blocks forever.

use super::{ConnectionParams, SerialParity, Transport};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use strokeplot_core::{ConnectionError, Error, Result};

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
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List serial ports that look like plotter controllers
///
/// Only USB/ACM style devices and Windows COM ports are returned:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_plotter_port(&port.port_name))
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, port_description(port));
            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    let info = info.with_usb_ids(usb.vid, usb.pid);
                    match &usb.manufacturer {
                        Some(mfg) => info.with_manufacturer(mfg),
                        None => info,
                    }
                }
                _ => info,
            }
        })
        .collect())
}

/// First plotter-like port, used when the configured port is "Auto"
pub fn find_default_port() -> Result<String> {
    list_ports()?
        .into_iter()
        .next()
        .map(|info| info.port_name)
        .ok_or_else(|| ConnectionError::NoPortFound.into())
}

fn is_plotter_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
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

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Accumulates raw bytes and yields complete lines
///
/// Both `\n` and `\r\n` terminators are accepted; the terminator is not part
/// of the returned line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Take the next complete line, if one has arrived
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Check if no partial data is buffered
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Serial transport backed by the `serialport` crate
///
/// Closing releases the port; later writes and reads fail.
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    buffer: LineBuffer,
}

impl SerialTransport {
    /// Open a serial port with the given parameters
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        params.validate()?;

        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let stop_bits = match params.stop_bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        };

        let builder = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(10))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            });

        match builder.open() {
            Ok(port) => {
                tracing::info!("Opened {} at {} baud", params.port, params.baud_rate);
                Ok(Self::from_port(port, &params.port))
            }
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                Err(ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    pub(crate) fn from_port(port: Box<dyn serialport::SerialPort>, name: &str) -> Self {
        Self {
            port: Some(port),
            name: name.to_string(),
            buffer: LineBuffer::new(),
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(ConnectionError::Io {
                reason: format!("{} is closed", self.name),
            }
            .into()),
        }
    }
}

fn io_error(e: io::Error) -> Error {
    ConnectionError::Io {
        reason: e.to_string(),
    }
    .into()
}

impl Transport for SerialTransport {
    fn write_line(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        let port = self.port_mut()?;
        port.write_all(&data).map_err(io_error)?;
        port.flush().map_err(io_error)?;
        tracing::trace!("-> {}", line);
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = self.buffer.next_line() {
                tracing::trace!("<- {}", line);
                return Ok(Some(line));
            }

            match self.port_mut()?.read(&mut chunk) {
                Ok(0) => {
                    return Err(ConnectionError::ConnectionLost {
                        reason: format!("{} returned end of stream", self.name),
                    }
                    .into())
                }
                Ok(n) => self.buffer.push(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(io_error(e)),
            }

            if Instant::now() >= deadline {
                return Ok(self.buffer.next_line());
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut port) = self.port.take() else {
            return Ok(());
        };
        self.buffer = LineBuffer::new();
        let flushed = port.flush().map_err(io_error);
        drop(port);
        tracing::info!("Closed {}", self.name);
        flushed
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
