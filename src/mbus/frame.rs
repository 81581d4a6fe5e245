//! # M-Bus Frame Codec
//!
//! This module packs M-Bus link-layer frames into their wire representation and
//! decodes them again. Decoding happens in two stages:
//!
//! - [`decode_progress`] inspects a partially received buffer and reports how
//!   many more bytes the frame needs. The receive loop uses it to read exactly
//!   up to the end of a frame and never beyond it.
//! - [`parse_frame`] (built on `nom`) extracts the structured [`MBusFrame`]
//!   once the buffer is complete; [`decode_complete`] adds checksum
//!   verification on top.
//!
//! ## Usage
//!
//! ```rust
//! use mbus_serial::mbus::frame::{decode_progress, pack_frame, FrameProgress, MBusFrame};
//!
//! let request = MBusFrame::req_ud2(0x01);
//! let bytes = pack_frame(&request).unwrap();
//! assert_eq!(bytes, vec![0x10, 0x5B, 0x01, 0x5C, 0x16]);
//!
//! assert_eq!(decode_progress(&bytes[..2]), FrameProgress::NeedMore(3));
//! assert_eq!(decode_progress(&bytes), FrameProgress::Complete);
//! ```

use crate::constants::{
    MBUS_CONTROL_INFO_DATA_SEND, MBUS_CONTROL_MASK_FCB, MBUS_CONTROL_MASK_REQ_UD2,
    MBUS_CONTROL_MASK_SND_NKE, MBUS_FRAME_ACK_START, MBUS_FRAME_LONG_HEADER_LENGTH,
    MBUS_FRAME_LONG_OVERHEAD, MBUS_FRAME_LONG_START, MBUS_FRAME_MIN_LENGTH_FIELD,
    MBUS_FRAME_SHORT_LENGTH, MBUS_FRAME_SHORT_START, MBUS_FRAME_STOP, PACKET_BUFF_SIZE,
};
use crate::error::MBusError;
use nom::bytes::complete::{tag, take};
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::be_u8;
use nom::sequence::tuple;
use nom::{Err as NomErr, IResult};

const LONG_START: &[u8] = &[MBUS_FRAME_LONG_START];
const STOP: &[u8] = &[MBUS_FRAME_STOP];

/// Represents an M-Bus frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MBusFrame {
    pub frame_type: MBusFrameType,
    pub control: u8,
    pub address: u8,
    pub control_information: u8,
    pub data: Vec<u8>,
    pub checksum: u8,
}

/// Represents the different types of M-Bus frames.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MBusFrameType {
    Ack,
    Short,
    Control,
    Long,
}

/// Result of inspecting a partially received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameProgress {
    /// The buffer holds one complete, well-formed frame.
    Complete,
    /// Exactly this many more bytes are needed before decoding again. The
    /// receive loop takes a count of zero as `Complete`.
    NeedMore(usize),
    /// The buffer can never become a valid frame.
    Malformed,
}

impl MBusFrame {
    /// Single character acknowledgement (`E5`).
    pub fn ack() -> Self {
        MBusFrame {
            frame_type: MBusFrameType::Ack,
            control: 0,
            address: 0,
            control_information: 0,
            data: Vec::new(),
            checksum: 0,
        }
    }

    /// Short frame with the checksum filled in.
    pub fn short(control: u8, address: u8) -> Self {
        let mut frame = MBusFrame {
            frame_type: MBusFrameType::Short,
            control,
            address,
            control_information: 0,
            data: Vec::new(),
            checksum: 0,
        };
        frame.checksum = calculate_checksum(&frame);
        frame
    }

    /// Control frame (long frame without data) or long frame, depending on
    /// whether `data` is empty.
    pub fn long(control: u8, address: u8, control_information: u8, data: Vec<u8>) -> Self {
        let frame_type = if data.is_empty() {
            MBusFrameType::Control
        } else {
            MBusFrameType::Long
        };
        let mut frame = MBusFrame {
            frame_type,
            control,
            address,
            control_information,
            data,
            checksum: 0,
        };
        frame.checksum = calculate_checksum(&frame);
        frame
    }

    /// SND_NKE: link reset / ping of a slave.
    pub fn snd_nke(address: u8) -> Self {
        Self::short(MBUS_CONTROL_MASK_SND_NKE, address)
    }

    /// REQ_UD2: request user data class 2.
    pub fn req_ud2(address: u8) -> Self {
        Self::short(MBUS_CONTROL_MASK_REQ_UD2, address)
    }

    /// REQ_UD2 with the FCB bit set. Meters configured for a fast reply
    /// (e.g. Landis+Gyr) take this as "woken at low speed, answer at high speed".
    pub fn req_ud2_baud_switch(address: u8) -> Self {
        Self::short(MBUS_CONTROL_MASK_REQ_UD2 | MBUS_CONTROL_MASK_FCB, address)
    }

    /// SND_UD carrying application data.
    pub fn snd_ud(control: u8, address: u8, data: Vec<u8>) -> Self {
        Self::long(control, address, MBUS_CONTROL_INFO_DATA_SEND, data)
    }
}

/// Packs an M-Bus frame into its wire representation.
///
/// The checksum is recalculated from the frame contents; `frame.checksum` is
/// ignored. Fails when the frame cannot be represented on the wire.
pub fn pack_frame(frame: &MBusFrame) -> Result<Vec<u8>, MBusError> {
    let mut data = Vec::new();

    match frame.frame_type {
        MBusFrameType::Ack => {
            // ACK frame: 0xE5
            data.push(MBUS_FRAME_ACK_START);
        }
        MBusFrameType::Short => {
            // Short frame: 0x10 | control | address | checksum | 0x16
            data.push(MBUS_FRAME_SHORT_START);
            data.push(frame.control);
            data.push(frame.address);
            data.push(calculate_checksum(frame));
            data.push(MBUS_FRAME_STOP);
        }
        MBusFrameType::Control => {
            if !frame.data.is_empty() {
                return Err(MBusError::EncodeError(format!(
                    "control frame carries {} data bytes",
                    frame.data.len()
                )));
            }
            pack_control_or_long_frame(&mut data, frame)?;
        }
        MBusFrameType::Long => {
            pack_control_or_long_frame(&mut data, frame)?;
        }
    }

    if data.len() > PACKET_BUFF_SIZE {
        return Err(MBusError::EncodeError(format!(
            "packed frame of {} bytes exceeds {PACKET_BUFF_SIZE}",
            data.len()
        )));
    }

    Ok(data)
}

/// Packs a control or long M-Bus frame into a byte vector.
/// 0x68 | length1 | length2 | 0x68 | control | address | control_information | data | checksum | 0x16
fn pack_control_or_long_frame(data: &mut Vec<u8>, frame: &MBusFrame) -> Result<(), MBusError> {
    let length = u8::try_from(frame.data.len() + MBUS_FRAME_MIN_LENGTH_FIELD).map_err(|_| {
        MBusError::EncodeError(format!(
            "{} data bytes do not fit the length field",
            frame.data.len()
        ))
    })?;

    data.push(MBUS_FRAME_LONG_START);
    data.push(length);
    data.push(length);
    data.push(MBUS_FRAME_LONG_START);
    data.push(frame.control);
    data.push(frame.address);
    data.push(frame.control_information);
    data.extend_from_slice(&frame.data);
    data.push(calculate_checksum(frame));
    data.push(MBUS_FRAME_STOP);
    Ok(())
}

/// Reports how far `buf` is from holding one complete frame.
///
/// Only ever asks for bytes that belong to the current frame, so a caller that
/// reads exactly the requested amount never consumes the start of the next one.
pub fn decode_progress(buf: &[u8]) -> FrameProgress {
    let Some(&start) = buf.first() else {
        return FrameProgress::NeedMore(1);
    };

    match start {
        MBUS_FRAME_ACK_START => FrameProgress::Complete,
        MBUS_FRAME_SHORT_START => {
            if buf.len() < MBUS_FRAME_SHORT_LENGTH {
                return FrameProgress::NeedMore(MBUS_FRAME_SHORT_LENGTH - buf.len());
            }
            if buf[4] != MBUS_FRAME_STOP || buf[3] != buf[1].wrapping_add(buf[2]) {
                return FrameProgress::Malformed;
            }
            FrameProgress::Complete
        }
        MBUS_FRAME_LONG_START => {
            if buf.len() < MBUS_FRAME_LONG_HEADER_LENGTH {
                return FrameProgress::NeedMore(MBUS_FRAME_LONG_HEADER_LENGTH - buf.len());
            }
            let length = buf[1] as usize;
            if buf[1] != buf[2] || length < MBUS_FRAME_MIN_LENGTH_FIELD {
                return FrameProgress::Malformed;
            }
            let total = length + MBUS_FRAME_LONG_OVERHEAD;
            if buf.len() < total {
                return FrameProgress::NeedMore(total - buf.len());
            }
            let body = &buf[4..4 + length];
            let checksum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
            if buf[3] != MBUS_FRAME_LONG_START
                || buf[total - 1] != MBUS_FRAME_STOP
                || buf[total - 2] != checksum
            {
                return FrameProgress::Malformed;
            }
            FrameProgress::Complete
        }
        _ => FrameProgress::Malformed,
    }
}

fn byte(input: &[u8]) -> IResult<&[u8], u8> {
    be_u8(input)
}

fn long_start(input: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(LONG_START)(input)
}

fn stop(input: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(STOP)(input)
}

/// Uses the `nom` crate to parse an M-Bus frame from a byte slice.
pub fn parse_frame(input: &[u8]) -> IResult<&[u8], MBusFrame> {
    let (input, start) = byte(input)?;

    match start {
        MBUS_FRAME_ACK_START => Ok((input, MBusFrame::ack())),
        MBUS_FRAME_SHORT_START => {
            let (input, (control, address, checksum)) = tuple((byte, byte, byte))(input)?;
            let (input, _) = stop(input)?;
            Ok((
                input,
                MBusFrame {
                    frame_type: MBusFrameType::Short,
                    control,
                    address,
                    control_information: 0,
                    data: Vec::new(),
                    checksum,
                },
            ))
        }
        MBUS_FRAME_LONG_START => {
            let (input, (length1, length2)) = tuple((byte, byte))(input)?;
            if length1 != length2 || (length1 as usize) < MBUS_FRAME_MIN_LENGTH_FIELD {
                return Err(NomErr::Error(NomError::new(input, ErrorKind::Verify)));
            }
            let (input, _) = long_start(input)?;
            let (input, (control, address, control_information)) =
                tuple((byte, byte, byte))(input)?;
            let (input, data): (&[u8], &[u8]) =
                take(length1 as usize - MBUS_FRAME_MIN_LENGTH_FIELD)(input)?;
            let (input, checksum) = byte(input)?;
            let (input, _) = stop(input)?;

            let frame_type = if length1 as usize == MBUS_FRAME_MIN_LENGTH_FIELD {
                MBusFrameType::Control
            } else {
                MBusFrameType::Long
            };
            Ok((
                input,
                MBusFrame {
                    frame_type,
                    control,
                    address,
                    control_information,
                    data: data.to_vec(),
                    checksum,
                },
            ))
        }
        _ => Err(NomErr::Error(NomError::new(input, ErrorKind::Tag))),
    }
}

/// Extracts the frame from a buffer that [`decode_progress`] reported complete
/// and verifies its checksum. Every failure, a checksum mismatch included, is
/// a `ParseError`.
pub fn decode_complete(buf: &[u8]) -> Result<MBusFrame, MBusError> {
    let (rest, frame) = parse_frame(buf).map_err(|e| MBusError::ParseError(format!("{e:?}")))?;
    if !rest.is_empty() {
        return Err(MBusError::ParseError(format!(
            "{} trailing bytes after frame",
            rest.len()
        )));
    }
    verify_frame(&frame).map_err(|e| MBusError::ParseError(e.to_string()))?;
    Ok(frame)
}

/// Verifies the integrity of an M-Bus frame.
pub fn verify_frame(frame: &MBusFrame) -> Result<(), MBusError> {
    let calculated_checksum = calculate_checksum(frame);
    if frame.checksum != calculated_checksum {
        return Err(MBusError::InvalidChecksum {
            expected: frame.checksum,
            calculated: calculated_checksum,
        });
    }
    Ok(())
}

/// Calculates the checksum of an M-Bus frame.
fn calculate_checksum(frame: &MBusFrame) -> u8 {
    match frame.frame_type {
        MBusFrameType::Ack => 0,
        MBusFrameType::Short => frame.control.wrapping_add(frame.address),
        MBusFrameType::Control | MBusFrameType::Long => frame
            .data
            .iter()
            .fold(
                frame
                    .control
                    .wrapping_add(frame.address)
                    .wrapping_add(frame.control_information),
                |acc, b| acc.wrapping_add(*b),
            ),
    }
}

/// The decoding collaborator of the receive loop.
pub trait FrameDecoder {
    /// Reports how many more bytes `buf` needs.
    fn progress(&mut self, buf: &[u8]) -> FrameProgress;

    /// Extracts the frame once `progress` reported it complete.
    fn complete(&mut self, buf: &[u8]) -> Result<MBusFrame, MBusError>;
}

/// Decoder for EN 13757-2 link-layer frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct MBusFrameDecoder;

impl FrameDecoder for MBusFrameDecoder {
    fn progress(&mut self, buf: &[u8]) -> FrameProgress {
        decode_progress(buf)
    }

    fn complete(&mut self, buf: &[u8]) -> Result<MBusFrame, MBusError> {
        decode_complete(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSP_UD: &[u8] = &[
        0x68, 0x08, 0x08, 0x68, 0x53, 0x01, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x63, 0x16,
    ];

    #[test]
    fn test_pack_short_frame_computes_checksum() {
        let mut frame = MBusFrame::req_ud2(0x01);
        frame.checksum = 0xAA;
        assert_eq!(pack_frame(&frame).unwrap(), vec![0x10, 0x5B, 0x01, 0x5C, 0x16]);
    }

    #[test]
    fn test_baud_switch_request_sets_fcb() {
        let frame = MBusFrame::req_ud2_baud_switch(0x05);
        assert_eq!(frame.control, 0x7B);
        assert_eq!(pack_frame(&frame).unwrap(), vec![0x10, 0x7B, 0x05, 0x80, 0x16]);
    }

    #[test]
    fn test_pack_control_frame() {
        let frame = MBusFrame::long(0x53, 0x01, 0x00, Vec::new());
        assert_eq!(frame.frame_type, MBusFrameType::Control);
        assert_eq!(
            pack_frame(&frame).unwrap(),
            vec![0x68, 0x03, 0x03, 0x68, 0x53, 0x01, 0x00, 0x54, 0x16]
        );
    }

    #[test]
    fn test_pack_long_frame() {
        let frame = MBusFrame::long(0x53, 0x01, 0x00, vec![1, 2, 3, 4, 5]);
        assert_eq!(pack_frame(&frame).unwrap(), RSP_UD);
    }

    #[test]
    fn test_pack_oversized_frame_fails() {
        let frame = MBusFrame::long(0x53, 0x01, 0x51, vec![0u8; 253]);
        assert!(matches!(pack_frame(&frame), Err(MBusError::EncodeError(_))));

        let frame = MBusFrame::long(0x53, 0x01, 0x51, vec![0u8; 252]);
        assert_eq!(pack_frame(&frame).unwrap().len(), 261);
    }

    #[test]
    fn test_progress_empty_buffer_asks_for_one_byte() {
        assert_eq!(decode_progress(&[]), FrameProgress::NeedMore(1));
    }

    #[test]
    fn test_progress_ack() {
        assert_eq!(decode_progress(&[0xE5]), FrameProgress::Complete);
    }

    #[test]
    fn test_progress_short_frame() {
        let bytes = [0x10, 0x40, 0x01, 0x41, 0x16];
        assert_eq!(decode_progress(&bytes[..1]), FrameProgress::NeedMore(4));
        assert_eq!(decode_progress(&bytes[..4]), FrameProgress::NeedMore(1));
        assert_eq!(decode_progress(&bytes), FrameProgress::Complete);
    }

    #[test]
    fn test_progress_short_frame_bad_checksum() {
        assert_eq!(
            decode_progress(&[0x10, 0x40, 0x01, 0x42, 0x16]),
            FrameProgress::Malformed
        );
        assert_eq!(
            decode_progress(&[0x10, 0x40, 0x01, 0x41, 0x17]),
            FrameProgress::Malformed
        );
    }

    #[test]
    fn test_progress_long_frame_steps() {
        assert_eq!(decode_progress(&RSP_UD[..1]), FrameProgress::NeedMore(2));
        assert_eq!(decode_progress(&RSP_UD[..3]), FrameProgress::NeedMore(11));
        assert_eq!(decode_progress(&RSP_UD[..13]), FrameProgress::NeedMore(1));
        assert_eq!(decode_progress(RSP_UD), FrameProgress::Complete);
    }

    #[test]
    fn test_progress_long_frame_malformed() {
        // length fields disagree
        assert_eq!(decode_progress(&[0x68, 0x08, 0x07]), FrameProgress::Malformed);
        // length field too small
        assert_eq!(decode_progress(&[0x68, 0x02, 0x02]), FrameProgress::Malformed);

        let mut corrupt = RSP_UD.to_vec();
        corrupt[9] ^= 0xFF;
        assert_eq!(decode_progress(&corrupt), FrameProgress::Malformed);
    }

    #[test]
    fn test_progress_unknown_start_byte() {
        assert_eq!(decode_progress(&[0xFF]), FrameProgress::Malformed);
    }

    #[test]
    fn test_decode_complete_long_frame() {
        let frame = decode_complete(RSP_UD).unwrap();
        assert_eq!(frame.frame_type, MBusFrameType::Long);
        assert_eq!(frame.control, 0x53);
        assert_eq!(frame.address, 0x01);
        assert_eq!(frame.data, vec![1, 2, 3, 4, 5]);
        assert_eq!(frame.checksum, 0x63);
    }

    #[test]
    fn test_decode_complete_rejects_bad_checksum() {
        match decode_complete(&[0x10, 0x40, 0x01, 0x00, 0x16]) {
            Err(MBusError::ParseError(msg)) => {
                assert_eq!(msg, "Invalid checksum: expected 0, calculated 65")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_complete_rejects_trailing_bytes() {
        let result = decode_complete(&[0xE5, 0xE5]);
        assert!(matches!(result, Err(MBusError::ParseError(_))));
    }
}
