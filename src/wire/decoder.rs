//! # Wire Frame Decoder
//!
//! Parses framed messages received from the collection service.
//! Malformed input always yields a typed `Framing` error.

use bytes::Buf;

use super::protocol::*;
use crate::error::{Result, TelemetryError};

/// Decode only the fixed 8-byte header
///
/// # Errors
///
/// Returns `Framing` if fewer than 8 bytes are available or the tag is unknown
pub fn decode_header(frame: &[u8]) -> Result<WireHeader> {
    if frame.len() < HEADER_SIZE {
        return Err(TelemetryError::Framing(format!(
            "Frame too short for header: {} bytes",
            frame.len()
        )));
    }

    let mut buf = &frame[..HEADER_SIZE];
    let tag = MessageTag::try_from(buf.get_u8())?;
    let device_id_len = buf.get_u8();
    let payload_len = buf.get_u16_le();
    let sequence = buf.get_u32_le();

    Ok(WireHeader {
        tag,
        device_id_len,
        payload_len,
        sequence,
    })
}

/// Decode a complete frame
///
/// # Arguments
///
/// * `frame` - One complete frame (header, device id, payload)
///
/// # Returns
///
/// * `Result<WireMessage>` - Decoded message
///
/// # Errors
///
/// Returns `Framing` if:
/// - Frame is shorter than the header or than the declared header+payload length
/// - Tag is not a known message kind
/// - Device id is not valid UTF-8
/// - Frame carries trailing bytes past the declared length
pub fn decode_frame(frame: &[u8]) -> Result<WireMessage> {
    let header = decode_header(frame)?;

    let expected = header.frame_len();
    if frame.len() < expected {
        return Err(TelemetryError::Framing(format!(
            "Frame too short: expected {} bytes, got {}",
            expected,
            frame.len()
        )));
    }
    if frame.len() > expected {
        return Err(TelemetryError::Framing(format!(
            "Trailing bytes: expected {} bytes, got {}",
            expected,
            frame.len()
        )));
    }

    let id_end = HEADER_SIZE + header.device_id_len as usize;
    let device_id = std::str::from_utf8(&frame[HEADER_SIZE..id_end])
        .map_err(|e| TelemetryError::Framing(format!("Device id is not UTF-8: {}", e)))?
        .to_string();
    let payload = frame[id_end..expected].to_vec();

    Ok(WireMessage {
        header,
        device_id,
        payload,
    })
}
