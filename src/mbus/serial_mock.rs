//! Mock serial port implementation for testing
//!
//! This module provides a scripted serial line that can be used to test the
//! M-Bus serial communication without requiring actual hardware. Incoming data
//! is queued as a sequence of read steps (data chunks, silent timeout quanta,
//! I/O errors); everything the transport does to the line is recorded.
//!
//! A `MockSerialPort` acts as its own [`LineOpener`]; all clones share state,
//! so a test keeps one clone for inspection and hands another to the handle.

use crate::mbus::frame::{pack_frame, MBusFrame};
use crate::mbus::line::{LineOpener, MBusBaudRate, SerialConfig, SerialLine};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Something the transport did to the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Open { path: String, baudrate: MBusBaudRate },
    Reconfigure(MBusBaudRate),
    Write(Vec<u8>),
    Drain,
    Close,
}

#[derive(Debug)]
enum ReadStep {
    Data(Vec<u8>),
    Silence,
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct MockState {
    rx: VecDeque<ReadStep>,
    tx: Vec<u8>,
    events: Vec<MockEvent>,
    read_requests: Vec<usize>,
    baudrate: Option<MBusBaudRate>,
    open: bool,
    fail_open: bool,
    fail_reconfigure: bool,
    write_limit: Option<usize>,
    next_write_error: Option<io::ErrorKind>,
}

/// Mock serial port that simulates bidirectional communication
#[derive(Debug, Clone, Default)]
pub struct MockSerialPort {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // a panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue one chunk of data. Reads never cross chunk boundaries.
    pub fn queue_rx_data(&self, data: &[u8]) {
        self.state().rx.push_back(ReadStep::Data(data.to_vec()));
    }

    /// Queue a packed frame as one chunk.
    pub fn queue_frame(&self, frame: &MBusFrame) {
        let bytes = pack_frame(frame).unwrap_or_default();
        self.queue_rx_data(&bytes);
    }

    /// Queue `count` reads that return zero bytes.
    pub fn queue_silence(&self, count: usize) {
        let mut state = self.state();
        for _ in 0..count {
            state.rx.push_back(ReadStep::Silence);
        }
    }

    /// Queue a read that fails.
    pub fn queue_read_error(&self, kind: io::ErrorKind) {
        self.state().rx.push_back(ReadStep::Error(kind));
    }

    pub fn fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    pub fn fail_reconfigure(&self, fail: bool) {
        self.state().fail_reconfigure = fail;
    }

    /// Accept at most `limit` bytes per write.
    pub fn limit_writes(&self, limit: usize) {
        self.state().write_limit = Some(limit);
    }

    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        self.state().next_write_error = Some(kind);
    }

    /// All bytes written so far.
    pub fn tx_data(&self) -> Vec<u8> {
        self.state().tx.clone()
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state().events.clone()
    }

    /// Buffer size of every read call, in order.
    pub fn read_requests(&self) -> Vec<usize> {
        self.state().read_requests.clone()
    }

    pub fn baud_rate(&self) -> Option<MBusBaudRate> {
        self.state().baudrate
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn open_count(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Open { .. }))
    }

    pub fn close_count(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Close))
    }

    pub fn reconfigure_count(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Reconfigure(_)))
    }

    fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        self.state().events.iter().filter(|e| pred(e)).count()
    }
}

/// An open mock line. Dropping it records a close.
#[derive(Debug)]
pub struct MockLine {
    port: MockSerialPort,
}

impl LineOpener for MockSerialPort {
    type Line = MockLine;

    fn open(&self, path: &str, config: &SerialConfig) -> io::Result<MockLine> {
        let mut state = self.state();
        if state.fail_open {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such device"));
        }
        state.open = true;
        state.baudrate = Some(config.baudrate);
        state.events.push(MockEvent::Open {
            path: path.to_owned(),
            baudrate: config.baudrate,
        });
        Ok(MockLine { port: self.clone() })
    }
}

impl SerialLine for MockLine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.port.state();
        state.read_requests.push(buf.len());

        match state.rx.pop_front() {
            None | Some(ReadStep::Silence) => Ok(0),
            Some(ReadStep::Error(kind)) => Err(io::Error::new(kind, "mock read failure")),
            Some(ReadStep::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                let rest = data.split_off(n);
                if !rest.is_empty() {
                    state.rx.push_front(ReadStep::Data(rest));
                }
                Ok(n)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.port.state();
        if let Some(kind) = state.next_write_error.take() {
            return Err(io::Error::new(kind, "mock write failure"));
        }
        let n = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        state.tx.extend_from_slice(&data[..n]);
        state.events.push(MockEvent::Write(data[..n].to_vec()));
        Ok(n)
    }

    fn drain(&mut self) -> io::Result<()> {
        self.port.state().events.push(MockEvent::Drain);
        Ok(())
    }

    fn reconfigure(&mut self, config: &SerialConfig) -> io::Result<()> {
        let mut state = self.port.state();
        if state.fail_reconfigure {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "mock tcsetattr failure"));
        }
        state.baudrate = Some(config.baudrate);
        state.events.push(MockEvent::Reconfigure(config.baudrate));
        Ok(())
    }
}

impl Drop for MockLine {
    fn drop(&mut self) {
        let mut state = self.port.state();
        state.open = false;
        state.events.push(MockEvent::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(port: &MockSerialPort) -> MockLine {
        port.open("/dev/ttyMOCK", &SerialConfig::default()).unwrap()
    }

    #[test]
    fn test_reads_split_chunks() {
        let port = MockSerialPort::new();
        port.queue_rx_data(&[1, 2, 3]);
        let mut line = open(&port);

        let mut buf = [0u8; 2];
        assert_eq!(line.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(line.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
        assert_eq!(line.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_queue_frame() {
        let port = MockSerialPort::new();
        port.queue_frame(&MBusFrame::snd_nke(0x01));
        let mut line = open(&port);

        let mut buf = [0u8; 8];
        assert_eq!(line.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], &[0x10, 0x40, 0x01, 0x41, 0x16]);
    }

    #[test]
    fn test_drop_records_close() {
        let port = MockSerialPort::new();
        let line = open(&port);
        assert!(port.is_open());
        drop(line);
        assert!(!port.is_open());
        assert_eq!(port.open_count(), 1);
        assert_eq!(port.close_count(), 1);
    }

    #[test]
    fn test_read_error_step() {
        let port = MockSerialPort::new();
        port.queue_read_error(io::ErrorKind::BrokenPipe);
        let mut line = open(&port);

        let mut buf = [0u8; 1];
        assert_eq!(
            line.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
