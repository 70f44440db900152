//! # Wire Frame Encoder
//!
//! Builds framed messages and stamps them with a per-connection sequence number.

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU32, Ordering};

use super::protocol::*;
use crate::error::{Result, TelemetryError};

/// Encode one frame
///
/// # Arguments
///
/// * `tag` - Message kind
/// * `device_id` - Sender identity (at most 255 bytes)
/// * `sequence` - Sequence number for this frame
/// * `payload` - Payload bytes
/// * `limit` - Configured payload ceiling; the effective limit is `min(limit, 65535)`
///
/// # Errors
///
/// - `PayloadTooLarge` if the payload exceeds the effective limit
/// - `InvalidArgument` if the device id does not fit its length byte
///
/// # Examples
///
/// ```no_run
/// use csi_telemetry::wire::encoder::encode_frame;
/// use csi_telemetry::wire::protocol::MessageTag;
///
/// let frame = encode_frame(MessageTag::Ping, "node-1", 0, &[0, 0, 0, 1], 1024)?;
/// assert_eq!(frame.len(), 8 + 6 + 4);
/// # Ok::<(), csi_telemetry::error::TelemetryError>(())
/// ```
pub fn encode_frame(
    tag: MessageTag,
    device_id: &str,
    sequence: u32,
    payload: &[u8],
    limit: usize,
) -> Result<Bytes> {
    let limit = limit.min(MAX_PAYLOAD_SIZE);
    if payload.len() > limit {
        return Err(TelemetryError::PayloadTooLarge {
            len: payload.len(),
            limit,
        });
    }

    let id = device_id.as_bytes();
    if id.len() > MAX_DEVICE_ID_LEN {
        return Err(TelemetryError::InvalidArgument(format!(
            "device id is {} bytes (max {})",
            id.len(),
            MAX_DEVICE_ID_LEN
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + id.len() + payload.len());
    frame.put_u8(tag.into());
    frame.put_u8(id.len() as u8);
    frame.put_u16_le(payload.len() as u16);
    frame.put_u32_le(sequence);
    frame.put_slice(id);
    frame.put_slice(payload);

    Ok(frame.freeze())
}

/// Per-connection encoder holding identity, payload limit and sequence counter
#[derive(Debug)]
pub struct WireEncoder {
    device_id: String,
    payload_limit: usize,
    sequence: AtomicU32,
}

impl WireEncoder {
    pub fn new(device_id: impl Into<String>, payload_limit: usize) -> Self {
        Self::with_sequence(device_id, payload_limit, 0)
    }

    /// Start the counter at an arbitrary value
    pub fn with_sequence(device_id: impl Into<String>, payload_limit: usize, first: u32) -> Self {
        Self {
            device_id: device_id.into(),
            payload_limit: payload_limit.min(MAX_PAYLOAD_SIZE),
            sequence: AtomicU32::new(first),
        }
    }

    /// Encode a frame, consuming one sequence number on success
    ///
    /// The counter wraps at `u32::MAX` without signalling anything.
    pub fn encode(&self, tag: MessageTag, payload: &[u8]) -> Result<Bytes> {
        Ok(self.stamp(self.frame(tag, payload)?))
    }

    /// Build a frame whose sequence field is left at zero
    ///
    /// Nothing is consumed; pair with [`WireEncoder::stamp`] when the frame
    /// is written, so wire order and sequence order agree.
    pub fn frame(&self, tag: MessageTag, payload: &[u8]) -> Result<Bytes> {
        encode_frame(tag, &self.device_id, 0, payload, self.payload_limit)
    }

    /// Write the next sequence number into a frame built by [`WireEncoder::frame`]
    pub fn stamp(&self, frame: Bytes) -> Bytes {
        if frame.len() < HEADER_SIZE {
            return frame;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut frame = BytesMut::from(frame.as_ref());
        frame[4..8].copy_from_slice(&sequence.to_le_bytes());
        frame.freeze()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn payload_limit(&self) -> usize {
        self.payload_limit
    }

    /// Sequence number the next frame will carry
    pub fn next_sequence(&self) -> u32 {
        self.sequence.load(Ordering::Relaxed)
    }
}
