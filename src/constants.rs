//! M-Bus Protocol Constants
//!
//! This module defines the link-layer constants used by the serial transport,
//! based on the EN 13757-2 standard.

// ----------------------------------------------------------------------------
// Frame delimiters
// ----------------------------------------------------------------------------

/// Single character acknowledgement
pub const MBUS_FRAME_ACK_START: u8 = 0xE5;

/// Start of a short frame
pub const MBUS_FRAME_SHORT_START: u8 = 0x10;

/// Start of a control or long frame (appears twice)
pub const MBUS_FRAME_LONG_START: u8 = 0x68;

/// Stop byte closing short, control and long frames
pub const MBUS_FRAME_STOP: u8 = 0x16;

pub const MBUS_FRAME_SHORT_LENGTH: usize = 5;

/// Bytes preceding the length field pair is checked (start, L, L)
pub const MBUS_FRAME_LONG_HEADER_LENGTH: usize = 3;

/// Bytes of a long frame that are not counted by its L field
pub const MBUS_FRAME_LONG_OVERHEAD: usize = 6;

/// Smallest legal L field: C, A and CI with no data
pub const MBUS_FRAME_MIN_LENGTH_FIELD: usize = 3;

// ----------------------------------------------------------------------------
// Control field
// ----------------------------------------------------------------------------

// Control masks (full control bytes for common commands)
pub const MBUS_CONTROL_MASK_SND_NKE: u8 = 0x40;
pub const MBUS_CONTROL_MASK_REQ_UD2: u8 = 0x5B; // includes DIR M2S
pub const MBUS_CONTROL_MASK_RSP_UD: u8 = 0x08; // S2M response

// Frame count bit
pub const MBUS_CONTROL_MASK_FCB: u8 = 0x20;

// Control information (CI) codes
pub const MBUS_CONTROL_INFO_DATA_SEND: u8 = 0x51;
pub const MBUS_CONTROL_INFO_RESP_VARIABLE: u8 = 0x72;

// ----------------------------------------------------------------------------
// Transport limits
// ----------------------------------------------------------------------------

/// Upper bound for a packed frame and for the receive buffer
pub const PACKET_BUFF_SIZE: usize = 2048;

/// Zero-byte reads tolerated by one receive call
pub const MBUS_RECV_TIMEOUT_LIMIT: usize = 3;

/// Receive attempts made after a baud-switch wake request
pub const MBUS_PROBE_RECV_ATTEMPTS: usize = 10;
