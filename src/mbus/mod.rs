//! The mbus module contains the components responsible for the M-Bus serial
//! transport: frame packing and incremental decoding, line configuration,
//! frame transmission and reception, event hooks and the baud-switch probe.

pub mod frame;
pub mod hooks;
pub mod line;
pub mod probe;
pub mod serial;
pub mod serial_mock;

pub use frame::*;
pub use hooks::EventHooks;
pub use line::*;
pub use probe::BaudSwitchProbe;
pub use serial::*;
