//! # Serial Line Configuration and Backends
//!
//! The receive and transmit logic never talks to the operating system directly.
//! It goes through [`SerialLine`], a small blocking capability:
//!
//! - `read` returns up to `buf.len()` bytes, or zero bytes once the line's
//!   inter-byte timeout quantum elapsed without data;
//! - `write` performs a single OS write and reports how much was accepted;
//! - `drain` blocks until the output buffer reached the wire;
//! - `reconfigure` applies a new baud rate together with its timeout quantum.
//!
//! [`NativeOpener`] provides the production backend on top of the `serialport`
//! crate. The scripted test double lives in `serial_mock`.

use crate::error::MBusError;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Baud rates the transport can drive an M-Bus line at.
///
/// Each rate carries the inter-byte timeout quantum derived from the link layer
/// response budget (330 bit times + 50 ms, plus 11 bit times for the first
/// character). The quantum is never stored apart from the rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum MBusBaudRate {
    Baud300,
    Baud1200,
    #[default]
    Baud2400,
    Baud9600,
}

impl MBusBaudRate {
    pub const ALL_RATES: [MBusBaudRate; 4] = [
        MBusBaudRate::Baud300,
        MBusBaudRate::Baud1200,
        MBusBaudRate::Baud2400,
        MBusBaudRate::Baud9600,
    ];

    pub fn as_u32(self) -> u32 {
        match self {
            MBusBaudRate::Baud300 => 300,
            MBusBaudRate::Baud1200 => 1200,
            MBusBaudRate::Baud2400 => 2400,
            MBusBaudRate::Baud9600 => 9600,
        }
    }

    /// Inter-byte timeout quantum in tenths of a second.
    pub fn timeout_quantum(self) -> u8 {
        match self {
            MBusBaudRate::Baud300 => 12,
            MBusBaudRate::Baud1200 => 4,
            MBusBaudRate::Baud2400 => 2,
            MBusBaudRate::Baud9600 => 1,
        }
    }

    /// The timeout quantum as a duration.
    pub fn timeout(self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_quantum()) * 100)
    }
}

impl TryFrom<u32> for MBusBaudRate {
    type Error = MBusError;

    fn try_from(rate: u32) -> Result<Self, Self::Error> {
        match rate {
            300 => Ok(MBusBaudRate::Baud300),
            1200 => Ok(MBusBaudRate::Baud1200),
            2400 => Ok(MBusBaudRate::Baud2400),
            9600 => Ok(MBusBaudRate::Baud9600),
            other => Err(MBusError::UnsupportedBaudRate(other)),
        }
    }
}

impl From<MBusBaudRate> for u32 {
    fn from(rate: MBusBaudRate) -> Self {
        rate.as_u32()
    }
}

impl std::fmt::Display for MBusBaudRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Line configuration.
///
/// Character framing is fixed for M-Bus: 8 data bits, even parity, one stop
/// bit, no flow control, modem control lines ignored. Only the baud rate (and
/// with it the timeout quantum) varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SerialConfig {
    #[serde(default)]
    pub baudrate: MBusBaudRate,
}

impl SerialConfig {
    pub fn new(baudrate: MBusBaudRate) -> Self {
        SerialConfig { baudrate }
    }

    pub fn timeout(&self) -> Duration {
        self.baudrate.timeout()
    }
}

/// Blocking byte-level access to an open serial line.
pub trait SerialLine {
    /// Reads up to `buf.len()` bytes. `Ok(0)` means the timeout quantum
    /// elapsed with no data.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Performs one write and returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Blocks until all written bytes have been transmitted.
    fn drain(&mut self) -> io::Result<()>;

    /// Applies baud rate and timeout quantum to the open line, immediately.
    fn reconfigure(&mut self, config: &SerialConfig) -> io::Result<()>;
}

/// Opens serial lines by device path.
pub trait LineOpener {
    type Line: SerialLine;

    fn open(&self, path: &str, config: &SerialConfig) -> io::Result<Self::Line>;
}

/// Production backend built on the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOpener;

/// A line opened by [`NativeOpener`].
pub struct NativeSerialLine {
    port: Box<dyn serialport::SerialPort>,
}

impl LineOpener for NativeOpener {
    type Line = NativeSerialLine;

    fn open(&self, path: &str, config: &SerialConfig) -> io::Result<NativeSerialLine> {
        // serialport opens with O_NOCTTY and sets CLOCAL | CREAD itself
        let port = serialport::new(path, config.baudrate.as_u32())
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::Even)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.timeout())
            .open()
            .map_err(io::Error::from)?;

        log::debug!(
            "Opened serial port {path} at {} baud (timeout {:?})",
            config.baudrate,
            config.timeout()
        );
        Ok(NativeSerialLine { port })
    }
}

impl SerialLine for NativeSerialLine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write(data)
    }

    fn drain(&mut self) -> io::Result<()> {
        // tcdrain() on unix
        self.port.flush()
    }

    fn reconfigure(&mut self, config: &SerialConfig) -> io::Result<()> {
        let previous = self.port.timeout();
        self.port.set_timeout(config.timeout()).map_err(io::Error::from)?;
        if let Err(e) = self.port.set_baud_rate(config.baudrate.as_u32()) {
            // keep rate and quantum in step
            let _ = self.port.set_timeout(previous);
            return Err(e.into());
        }
        Ok(())
    }
}
