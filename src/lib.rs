//! # mbus-serial - M-Bus (Meter-Bus) Serial Transport
//!
//! The mbus-serial crate drives an M-Bus line over a serial port: it opens and
//! configures the line, transmits frames, and receives frames byte by byte
//! under the protocol's timing rules. M-Bus is the European standard
//! (EN 13757) for reading utility meters such as electricity, gas, water and
//! heat meters over a shared two-wire bus.
//!
//! ## Features
//!
//! - Connect to a serial device with the M-Bus character framing (8E1, local mode)
//! - Switch between 300, 1200, 2400 and 9600 baud, each with its own timeout quantum
//! - Send frames, blocking until they have left the UART
//! - Receive frames incrementally, never reading past the end of a frame
//! - Observe raw traffic through per-handle event hooks
//! - Read meters that answer at a higher speed than they are addressed at
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mbus_serial::{BaudSwitchProbe, MBusDeviceHandle, MBusError};
//!
//! fn read_meter() -> Result<(), MBusError> {
//!     let mut handle = MBusDeviceHandle::connect("/dev/ttyUSB0")?;
//!     handle.set_baud_rate(2400)?;
//!
//!     let reply = BaudSwitchProbe::default().run(&mut handle, 5)?;
//!     println!("{:02X?}", reply.data);
//!
//!     handle.disconnect()
//! }
//! ```
//!
//! All I/O blocks the calling thread. A handle owns its line and must not be
//! shared between threads without external synchronisation.

pub mod constants;
pub mod error;
pub mod logging;
pub mod mbus;

pub use crate::error::MBusError;
pub use crate::logging::{init_logger, log_info};

pub use mbus::frame::{
    decode_complete, decode_progress, pack_frame, parse_frame, FrameDecoder, FrameProgress,
    MBusFrame, MBusFrameDecoder, MBusFrameType,
};
pub use mbus::hooks::EventHooks;
pub use mbus::line::{LineOpener, MBusBaudRate, NativeOpener, SerialConfig, SerialLine};
pub use mbus::probe::BaudSwitchProbe;
pub use mbus::serial::{receive_frame, MBusDeviceHandle};

/// Connect to an M-Bus line via serial port.
///
/// # Arguments
/// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux)
///
/// # Returns
/// * `Ok(MBusDeviceHandle)` - Connected handle, configured for 2400 baud
/// * `Err(MBusError)` - The device could not be opened
pub fn connect(port: &str) -> Result<MBusDeviceHandle, MBusError> {
    MBusDeviceHandle::connect(port)
}

/// Disconnect from the M-Bus line.
pub fn disconnect<O: LineOpener>(handle: &mut MBusDeviceHandle<O>) -> Result<(), MBusError> {
    handle.disconnect()
}

/// Change the baud rate (300, 1200, 2400 or 9600) of a connected line.
pub fn set_baud_rate<O: LineOpener>(
    handle: &mut MBusDeviceHandle<O>,
    rate: u32,
) -> Result<(), MBusError> {
    handle.set_baud_rate(rate)
}

/// Send a frame to the M-Bus line.
///
/// # Arguments
/// * `handle` - Device handle to send through
/// * `frame` - Frame to send
///
/// # Returns
/// * `Ok(())` - Frame written and drained
/// * `Err(MBusError)` - Encoding or writing failed
pub fn send_frame<O: LineOpener>(
    handle: &mut MBusDeviceHandle<O>,
    frame: &MBusFrame,
) -> Result<(), MBusError> {
    handle.send_frame(frame)
}

/// Receive a frame from the M-Bus line.
///
/// # Returns
/// * `Ok(MBusFrame)` - Received and verified frame
/// * `Err(MBusError)` - Nothing, too little, or garbage arrived
pub fn recv_frame<O: LineOpener>(handle: &mut MBusDeviceHandle<O>) -> Result<MBusFrame, MBusError> {
    handle.recv_frame()
}
