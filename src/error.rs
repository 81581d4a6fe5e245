//! # M-Bus Error Handling
//!
//! This module defines the MBusError enum, which represents the different error
//! types that can occur while driving an M-Bus serial line.
//!
//! Two of the variants are soft outcomes rather than faults: `IncompleteFrame`
//! and `NoResponse` are what a caller sees when nobody (or nobody in full)
//! answered at an address. See [`MBusError::is_soft`].

use std::io;
use thiserror::Error;

/// Represents the different error types that can occur in the M-Bus crate.
#[derive(Debug, Error)]
pub enum MBusError {
    /// The serial device could not be opened.
    #[error("Failed to open serial device {device}: {source}")]
    ConnectError {
        device: String,
        #[source]
        source: io::Error,
    },

    /// The requested baud rate is not one of 300, 1200, 2400 or 9600.
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// Configuring or closing the line failed.
    #[error("Serial port error: {0}")]
    Io(#[from] io::Error),

    /// The handle has no open line.
    #[error("Serial line is not connected")]
    NotConnected,

    /// The frame could not be packed into its wire representation.
    #[error("Failed to encode M-Bus frame: {0}")]
    EncodeError(String),

    /// The OS accepted fewer bytes than the packed frame holds.
    #[error("Failed to write frame: wrote {written} of {expected} bytes")]
    WriteError { written: usize, expected: usize },

    /// Writing to the line failed outright.
    #[error("Failed to write frame: {0}")]
    WriteIo(#[source] io::Error),

    /// Nothing at all was received.
    #[error("No data received")]
    NoData,

    /// Some bytes arrived but the frame never completed.
    #[error("Incomplete M-Bus frame ({received} bytes received)")]
    IncompleteFrame { received: usize },

    /// Indicates an error when parsing an M-Bus frame.
    #[error("Error parsing M-Bus frame: {0}")]
    ParseError(String),

    /// The line stayed silent for the whole receive budget.
    #[error("Timed out waiting for M-Bus frame")]
    ReceiveTimeout,

    /// Reading from the line failed.
    #[error("Failed to read from serial line: {0}")]
    ReadError(#[source] io::Error),

    /// The baud-switch probe exhausted its receive attempts.
    #[error("No response from address {address} after {attempts} attempts")]
    NoResponse { address: u8, attempts: usize },

    /// Indicates a checksum mismatch.
    #[error("Invalid checksum: expected {expected}, calculated {calculated}")]
    InvalidChecksum { expected: u8, calculated: u8 },
}

impl MBusError {
    /// Returns true for outcomes that are expected when probing an address
    /// with no (complete) responder.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            MBusError::IncompleteFrame { .. } | MBusError::NoResponse { .. }
        )
    }
}
