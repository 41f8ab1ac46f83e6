//! Transports between the host and the plotter controller.
//!
//! A transport is line oriented: the streamer writes one command line and
//! reads reply lines. Reads are bounded by a timeout so that no wait can hang
//! forever.

pub mod serial;
pub mod simulator;
pub mod streamer;

use std::time::Duration;
use strokeplot_core::{ConnectionError, Result};

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters used to open a serial transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware (RTS/CTS) flow control
    pub flow_control: bool,
}

impl ConnectionParams {
    /// Parameters for a port at the given baud rate, 8N1 without flow control
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
        }
    }

    /// Check the parameters before opening a port
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "port name is empty".to_string(),
            }
            .into());
        }
        if self.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be > 0".to_string(),
            }
            .into());
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConnectionError::InvalidParameters {
                reason: format!("invalid data bits: {}", self.data_bits),
            }
            .into());
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(ConnectionError::InvalidParameters {
                reason: format!("invalid stop bits: {}", self.stop_bits),
            }
            .into());
        }
        Ok(())
    }
}

/// A line-oriented link to a controller
///
/// Implementations are owned by exactly one streamer for the length of a run.
pub trait Transport: Send {
    /// Write one line; a newline terminator is appended
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Read the next line without its terminator, waiting at most `timeout`
    ///
    /// Returns `Ok(None)` when no complete line arrived in time.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>>;

    /// Close the link
    fn close(&mut self) -> Result<()>;

    /// Human readable name for logs
    fn name(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_line(&mut self, line: &str) -> Result<()> {
        (**self).write_line(line)
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        (**self).read_line(timeout)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}
