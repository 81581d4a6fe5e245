//! # M-Bus Serial Communication
//!
//! This module provides the implementation for handling the serial communication
//! aspect of the M-Bus protocol: connecting to the serial line, switching its
//! baud rate, sending M-Bus frames, and receiving M-Bus frames.
//!
//! Reception is incremental. M-Bus frames only reveal their length once the
//! header has arrived, and on a shared bus reading past the end of a frame would
//! eat the start of the next one. [`receive_frame`] therefore asks the decoder
//! after every read how many bytes are still missing and requests exactly that
//! many. Silence on the line is bounded: after three zero-byte reads (three
//! timeout quanta) the call gives up.
//!
//! All operations block the calling thread. A handle owns its line exclusively
//! and provides no internal locking.

use crate::constants::{MBUS_RECV_TIMEOUT_LIMIT, PACKET_BUFF_SIZE};
use crate::error::MBusError;
use crate::mbus::frame::{pack_frame, FrameDecoder, FrameProgress, MBusFrame, MBusFrameDecoder};
use crate::mbus::hooks::EventHooks;
use crate::mbus::line::{LineOpener, MBusBaudRate, NativeOpener, SerialConfig, SerialLine};
use bytes::BytesMut;

/// Represents a handle to the M-Bus serial connection.
///
/// The handle remembers its device path so the line can be closed and opened
/// again (the baud-switch probe needs a fresh open). Dropping the handle closes
/// the line.
pub struct MBusDeviceHandle<O: LineOpener = NativeOpener> {
    device: String,
    opener: O,
    line: Option<O::Line>,
    config: SerialConfig,
    hooks: EventHooks,
}

impl MBusDeviceHandle<NativeOpener> {
    /// Opens `device` with the default line configuration (8 data bits, even
    /// parity, local mode, 2400 baud).
    pub fn connect(device: &str) -> Result<Self, MBusError> {
        Self::connect_with(NativeOpener, device, EventHooks::new())
    }

    /// Like [`connect`](Self::connect), observing every frame with `hooks`.
    pub fn connect_with_hooks(device: &str, hooks: EventHooks) -> Result<Self, MBusError> {
        Self::connect_with(NativeOpener, device, hooks)
    }
}

impl<O: LineOpener> MBusDeviceHandle<O> {
    /// Opens `device` through `opener`. The hooks are fixed for the lifetime
    /// of the handle.
    pub fn connect_with(opener: O, device: &str, hooks: EventHooks) -> Result<Self, MBusError> {
        let mut handle = MBusDeviceHandle {
            device: device.to_owned(),
            opener,
            line: None,
            config: SerialConfig::default(),
            hooks,
        };
        handle.reconnect()?;
        Ok(handle)
    }

    /// Opens the device again with the default configuration, closing the
    /// current line first if there is one.
    pub fn reconnect(&mut self) -> Result<(), MBusError> {
        self.line = None;
        self.config = SerialConfig::default();

        let config = SerialConfig::default();
        let line = self
            .opener
            .open(&self.device, &config)
            .map_err(|source| MBusError::ConnectError {
                device: self.device.clone(),
                source,
            })?;

        log::debug!("Connected to {} at {} baud", self.device, config.baudrate);
        self.line = Some(line);
        self.config = config;
        Ok(())
    }

    /// Closes the line. Closing an already closed handle does nothing.
    pub fn disconnect(&mut self) -> Result<(), MBusError> {
        match self.line.take() {
            Some(line) => {
                drop(line);
                log::debug!("Disconnected from {}", self.device);
            }
            None => log::debug!("{} is already disconnected", self.device),
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.line.is_some()
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn baud_rate(&self) -> MBusBaudRate {
        self.config.baudrate
    }

    /// Switches the line to `rate` (300, 1200, 2400 or 9600 baud) together
    /// with the matching timeout quantum. Takes effect immediately.
    ///
    /// An unsupported rate is rejected before the line is touched.
    pub fn set_baud_rate(&mut self, rate: u32) -> Result<(), MBusError> {
        let config = SerialConfig::new(MBusBaudRate::try_from(rate)?);
        let line = self.line.as_mut().ok_or(MBusError::NotConnected)?;
        line.reconfigure(&config)?;

        log::debug!(
            "{}: baud rate {} (timeout {:?})",
            self.device,
            config.baudrate,
            config.timeout()
        );
        self.config = config;
        Ok(())
    }

    /// Packs `frame` and writes it to the line in a single write, then waits
    /// until it has left the output buffer.
    ///
    /// The send hook sees the exact bytes written, after the write succeeded
    /// and before the drain.
    pub fn send_frame(&mut self, frame: &MBusFrame) -> Result<(), MBusError> {
        let data = pack_frame(frame)?;
        let line = self.line.as_mut().ok_or(MBusError::NotConnected)?;

        let written = line.write(&data).map_err(MBusError::WriteIo)?;
        if written != data.len() {
            log::warn!(
                "{}: short write ({written} of {} bytes)",
                self.device,
                data.len()
            );
            return Err(MBusError::WriteError {
                written,
                expected: data.len(),
            });
        }

        self.hooks.fire_send(&data);

        line.drain()?;
        Ok(())
    }

    /// Receives one frame using the link-layer decoder.
    pub fn recv_frame(&mut self) -> Result<MBusFrame, MBusError> {
        self.recv_frame_with(&mut MBusFrameDecoder)
    }

    /// Receives one frame, letting `decoder` drive how many bytes are read.
    pub fn recv_frame_with<D: FrameDecoder + ?Sized>(
        &mut self,
        decoder: &mut D,
    ) -> Result<MBusFrame, MBusError> {
        let line = self.line.as_mut().ok_or(MBusError::NotConnected)?;
        receive_frame(line, decoder, &self.hooks)
    }

    /// Sends a request and waits for the response.
    pub fn request_response(&mut self, request: &MBusFrame) -> Result<MBusFrame, MBusError> {
        self.send_frame(request)?;
        self.recv_frame()
    }

    /// Sends REQ_UD2 to a primary address at the current baud rate and returns
    /// the reply.
    pub fn send_request(&mut self, address: u8) -> Result<MBusFrame, MBusError> {
        self.request_response(&MBusFrame::req_ud2(address))
    }
}

/// The incremental reception loop.
///
/// Starts by asking for one byte and from then on reads exactly what the
/// decoder reports missing. Outcomes:
///
/// - a hard read error aborts at once with `ReadError`;
/// - three zero-byte reads end the loop; with nothing received that is
///   `ReceiveTimeout`, otherwise the partial frame yields `IncompleteFrame`;
/// - the decoder finishing without any bytes yields `NoData`;
/// - a malformed buffer, or a decoder asking for more than the packet
///   buffer holds, yields `ParseError`.
///
/// A decoder reporting zero bytes missing is treated as complete.
///
/// The receive hook fires once with everything received whenever at least one
/// byte arrived, complete frame or not.
pub fn receive_frame<L, D>(
    line: &mut L,
    decoder: &mut D,
    hooks: &EventHooks,
) -> Result<MBusFrame, MBusError>
where
    L: SerialLine + ?Sized,
    D: FrameDecoder + ?Sized,
{
    let mut buf = BytesMut::with_capacity(PACKET_BUFF_SIZE);
    let mut progress = FrameProgress::NeedMore(1);
    let mut timeouts = 0;
    let mut timed_out = false;

    while let FrameProgress::NeedMore(remaining) = progress {
        let len = buf.len();
        if remaining > PACKET_BUFF_SIZE - len {
            log::warn!("Decoder asked for {remaining} more bytes beyond {len}, giving up");
            progress = FrameProgress::Malformed;
            break;
        }

        buf.resize(len + remaining, 0);
        let nread = line.read(&mut buf[len..]).map_err(MBusError::ReadError)?;
        buf.truncate(len + nread);

        if nread == 0 {
            timeouts += 1;
            log::debug!("Read timeout {timeouts}/{MBUS_RECV_TIMEOUT_LIMIT} ({len} bytes so far)");
            if timeouts >= MBUS_RECV_TIMEOUT_LIMIT {
                timed_out = true;
                break;
            }
        }

        progress = match decoder.progress(&buf) {
            FrameProgress::NeedMore(0) => FrameProgress::Complete,
            other => other,
        };
    }

    if buf.is_empty() {
        if timed_out {
            log::warn!("Timeout waiting for M-Bus frame");
            return Err(MBusError::ReceiveTimeout);
        }
        return Err(MBusError::NoData);
    }

    hooks.fire_recv(&buf);

    match progress {
        FrameProgress::NeedMore(_) => {
            log::warn!("Timeout with incomplete frame ({} bytes)", buf.len());
            Err(MBusError::IncompleteFrame {
                received: buf.len(),
            })
        }
        FrameProgress::Malformed => Err(MBusError::ParseError(format!(
            "malformed frame data: {}",
            hex::encode_upper(&buf)
        ))),
        FrameProgress::Complete => decoder.complete(&buf),
    }
}
