//! # Baud-Switch Probe
//!
//! Some meters (Landis+Gyr heat meters among them) are addressed at the bus
//! default speed but answer at a higher one. Reading them takes a fixed
//! sequence:
//!
//! 1. send the wake request (REQ_UD2 with FCB set) at the current speed;
//! 2. close and reopen the line, since some adapters only switch cleanly on
//!    a fresh open;
//! 3. switch to the target speed;
//! 4. poll for the reply, which typically arrives several hundred
//!    milliseconds late, with up to `attempts` receive calls.

use crate::constants::MBUS_PROBE_RECV_ATTEMPTS;
use crate::error::MBusError;
use crate::mbus::frame::MBusFrame;
use crate::mbus::line::{LineOpener, MBusBaudRate};
use crate::mbus::serial::MBusDeviceHandle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaudSwitchProbe {
    /// Speed the meter answers at.
    pub target_baudrate: MBusBaudRate,
    /// Receive calls made before giving up.
    pub attempts: usize,
}

impl Default for BaudSwitchProbe {
    fn default() -> Self {
        BaudSwitchProbe {
            target_baudrate: MBusBaudRate::Baud9600,
            attempts: MBUS_PROBE_RECV_ATTEMPTS,
        }
    }
}

impl BaudSwitchProbe {
    pub fn new(target_baudrate: MBusBaudRate) -> Self {
        BaudSwitchProbe {
            target_baudrate,
            ..Self::default()
        }
    }

    /// Requests data from the meter at primary `address`.
    ///
    /// Failures while sending or reconfiguring are returned as they are. If
    /// none of the receive attempts yields a complete frame the result is
    /// `NoResponse`, the normal outcome for an address nobody answers on. On
    /// return the line is left at the target speed.
    pub fn run<O: LineOpener>(
        &self,
        handle: &mut MBusDeviceHandle<O>,
        address: u8,
    ) -> Result<MBusFrame, MBusError> {
        log::debug!(
            "Probing address {address}: wake at {} baud, reply at {} baud",
            handle.baud_rate(),
            self.target_baudrate
        );

        handle.send_frame(&MBusFrame::req_ud2_baud_switch(address))?;

        handle.disconnect()?;
        handle.reconnect()?;
        handle.set_baud_rate(self.target_baudrate.as_u32())?;

        for attempt in 1..=self.attempts {
            match handle.recv_frame() {
                Ok(frame) => {
                    log::debug!("Address {address} answered on attempt {attempt}");
                    return Ok(frame);
                }
                Err(e) => log::debug!("Attempt {attempt}/{}: {e}", self.attempts),
            }
        }

        Err(MBusError::NoResponse {
            address,
            attempts: self.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MBUS_RECV_TIMEOUT_LIMIT;
    use crate::mbus::frame::MBusFrameType;
    use crate::mbus::hooks::EventHooks;
    use crate::mbus::serial_mock::{MockEvent, MockSerialPort};

    fn connect(mock: &MockSerialPort) -> MBusDeviceHandle<MockSerialPort> {
        MBusDeviceHandle::connect_with(mock.clone(), "/dev/ttyMOCK", EventHooks::new()).unwrap()
    }

    #[test]
    fn test_probe_sequence_order() {
        let mock = MockSerialPort::new();
        mock.queue_rx_data(&[0xE5]);
        let mut handle = connect(&mock);

        BaudSwitchProbe::default().run(&mut handle, 0x05).unwrap();

        let open = MockEvent::Open {
            path: "/dev/ttyMOCK".into(),
            baudrate: MBusBaudRate::Baud2400,
        };
        assert_eq!(
            mock.events(),
            vec![
                open.clone(),
                MockEvent::Write(vec![0x10, 0x7B, 0x05, 0x80, 0x16]),
                MockEvent::Drain,
                MockEvent::Close,
                open,
                MockEvent::Reconfigure(MBusBaudRate::Baud9600),
            ]
        );
        assert_eq!(handle.baud_rate(), MBusBaudRate::Baud9600);
    }

    #[test]
    fn test_probe_succeeds_on_last_attempt() {
        let mock = MockSerialPort::new();
        mock.queue_silence(9 * MBUS_RECV_TIMEOUT_LIMIT);
        mock.queue_rx_data(&[0xE5]);
        let mut handle = connect(&mock);

        let frame = BaudSwitchProbe::default().run(&mut handle, 0x01).unwrap();
        assert_eq!(frame.frame_type, MBusFrameType::Ack);
        assert_eq!(mock.read_requests().len(), 9 * MBUS_RECV_TIMEOUT_LIMIT + 1);
    }

    #[test]
    fn test_probe_gives_up_after_attempts() {
        let mock = MockSerialPort::new();
        let mut handle = connect(&mock);

        let result = BaudSwitchProbe::default().run(&mut handle, 0x01);
        assert!(matches!(
            result,
            Err(MBusError::NoResponse {
                address: 0x01,
                attempts: 10
            })
        ));
        assert_eq!(mock.read_requests().len(), 10 * MBUS_RECV_TIMEOUT_LIMIT);
    }

    #[test]
    fn test_probe_retries_after_incomplete_frame() {
        let mock = MockSerialPort::new();
        mock.queue_rx_data(&[0x10, 0x08]);
        mock.queue_silence(MBUS_RECV_TIMEOUT_LIMIT);
        mock.queue_frame(&MBusFrame::short(0x08, 0x01));
        let mut handle = connect(&mock);

        let frame = BaudSwitchProbe::default().run(&mut handle, 0x01).unwrap();
        assert_eq!(frame.frame_type, MBusFrameType::Short);
        assert_eq!(frame.control, 0x08);
    }

    #[test]
    fn test_probe_stops_when_reconnect_fails() {
        let mock = MockSerialPort::new();
        let mut handle = connect(&mock);
        mock.fail_open(true);

        let result = BaudSwitchProbe::default().run(&mut handle, 0x01);
        assert!(matches!(result, Err(MBusError::ConnectError { .. })));
        assert!(mock.read_requests().is_empty());
    }

    #[test]
    fn test_probe_config_from_json() {
        let probe: BaudSwitchProbe =
            serde_json::from_str(r#"{"target_baudrate": 1200, "attempts": 4}"#).unwrap();
        assert_eq!(probe.target_baudrate, MBusBaudRate::Baud1200);
        assert_eq!(probe.attempts, 4);

        let probe: BaudSwitchProbe = serde_json::from_str("{}").unwrap();
        assert_eq!(probe, BaudSwitchProbe::default());

        assert!(serde_json::from_str::<BaudSwitchProbe>(r#"{"target_baudrate": 4800}"#).is_err());
    }
}
