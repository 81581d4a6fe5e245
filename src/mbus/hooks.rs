//! # Frame Event Hooks
//!
//! Observers that see the raw bytes of every transmitted and received frame.
//! A set of hooks is handed to a device handle when it is created and stays
//! fixed for the handle's lifetime, so independent handles in one process
//! can observe their traffic separately.
//!
//! ```rust
//! use mbus_serial::mbus::hooks::EventHooks;
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//!
//! let mut hooks = EventHooks::new();
//! hooks.register_recv_hook(move |bytes: &[u8]| sink.lock().unwrap().extend_from_slice(bytes));
//! hooks.fire_recv(&[0xE5]);
//!
//! assert_eq!(*seen.lock().unwrap(), vec![0xE5]);
//! ```

use std::fmt;
use std::sync::Arc;

/// Callback receiving a borrowed view of the bytes on the wire.
pub type FrameHook = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Outbound and inbound frame observers.
#[derive(Clone, Default)]
pub struct EventHooks {
    send: Option<FrameHook>,
    recv: Option<FrameHook>,
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks that log every frame as a hex dump, e.g.
    /// `SEND (005): 10 5B 01 5C 16`.
    pub fn hex_dump() -> Self {
        let mut hooks = Self::new();
        hooks.register_send_hook(|bytes: &[u8]| log::info!("{}", dump_line("SEND", bytes)));
        hooks.register_recv_hook(|bytes: &[u8]| log::info!("{}", dump_line("RECV", bytes)));
        hooks
    }

    /// Installs the outbound hook, replacing any previous one.
    pub fn register_send_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.send = Some(Arc::new(hook));
        self
    }

    /// Installs the inbound hook, replacing any previous one.
    pub fn register_recv_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.recv = Some(Arc::new(hook));
        self
    }

    pub fn has_send_hook(&self) -> bool {
        self.send.is_some()
    }

    pub fn has_recv_hook(&self) -> bool {
        self.recv.is_some()
    }

    pub fn fire_send(&self, bytes: &[u8]) {
        if let Some(hook) = &self.send {
            hook(bytes);
        }
    }

    pub fn fire_recv(&self, bytes: &[u8]) {
        if let Some(hook) = &self.recv {
            hook(bytes);
        }
    }
}

impl fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHooks")
            .field("send", &self.send.is_some())
            .field("recv", &self.recv.is_some())
            .finish()
    }
}

/// Formats one dump line: direction, byte count, space separated hex.
pub fn dump_line(direction: &str, bytes: &[u8]) -> String {
    let encoded = hex::encode_upper(bytes);
    let spaced = encoded
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or("??"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{direction} ({:03}): {spaced}", bytes.len())
}
