//! # Wire Protocol Constants and Types
//!
//! Frame layout shared by the streaming channel and the collection service:
//!
//! ```text
//! ┌──────┬───────────────┬─────────────┬──────────┬───────────┬─────────┐
//! │ Tag  │ Device ID len │ Payload len │ Sequence │ Device ID │ Payload │
//! │ 1    │ 1             │ 2 (LE)      │ 4 (LE)   │ N         │ M       │
//! └──────┴───────────────┴─────────────┴──────────┴───────────┴─────────┘
//! ```

use crate::error::TelemetryError;

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest payload the 16-bit length field can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Largest device id the 8-bit length field can describe
pub const MAX_DEVICE_ID_LEN: usize = u8::MAX as usize;

/// Maximum number of samples carried by one batch message
pub const MAX_BATCH_SAMPLES: usize = 50;

/// Message kind carried in the first header byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    /// Single real-time CSI sample
    CsiData = 1,
    /// System performance metrics
    SystemMetrics = 2,
    /// Device heartbeat
    Heartbeat = 3,
    /// Alert or warning
    Alert = 4,
    /// Up to 50 CSI samples in one message
    BatchCsi = 5,
    /// Latency probe
    Ping = 6,
    /// Latency probe answer
    Pong = 7,
}

impl TryFrom<u8> for MessageTag {
    type Error = TelemetryError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageTag::CsiData),
            2 => Ok(MessageTag::SystemMetrics),
            3 => Ok(MessageTag::Heartbeat),
            4 => Ok(MessageTag::Alert),
            5 => Ok(MessageTag::BatchCsi),
            6 => Ok(MessageTag::Ping),
            7 => Ok(MessageTag::Pong),
            other => Err(TelemetryError::Framing(format!("Unknown message tag: 0x{:02X}", other))),
        }
    }
}

impl From<MessageTag> for u8 {
    fn from(tag: MessageTag) -> Self {
        tag as u8
    }
}

/// Decoded fixed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub tag: MessageTag,
    pub device_id_len: u8,
    pub payload_len: u16,
    pub sequence: u32,
}

impl WireHeader {
    /// Total frame length this header describes
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.device_id_len as usize + self.payload_len as usize
    }
}

/// A complete decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub header: WireHeader,
    pub device_id: String,
    pub payload: Vec<u8>,
}

impl WireMessage {
    pub fn tag(&self) -> MessageTag {
        self.header.tag
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_values() {
        assert_eq!(u8::from(MessageTag::CsiData), 1);
        assert_eq!(u8::from(MessageTag::SystemMetrics), 2);
        assert_eq!(u8::from(MessageTag::Heartbeat), 3);
        assert_eq!(u8::from(MessageTag::Alert), 4);
        assert_eq!(u8::from(MessageTag::BatchCsi), 5);
        assert_eq!(u8::from(MessageTag::Ping), 6);
        assert_eq!(u8::from(MessageTag::Pong), 7);
    }

    #[test]
    fn test_tag_try_from_roundtrip() {
        for value in 1u8..=7 {
            let tag = MessageTag::try_from(value).unwrap();
            assert_eq!(u8::from(tag), value);
        }
    }

    #[test]
    fn test_unknown_tags_rejected() {
        for value in [0u8, 8, 0x42, 0xFF] {
            match MessageTag::try_from(value) {
                Err(TelemetryError::Framing(msg)) => assert!(msg.contains("Unknown message tag")),
                other => panic!("Expected Framing error for {}, got {:?}", value, other),
            }
        }
    }

    #[test]
    fn test_frame_len() {
        let header = WireHeader {
            tag: MessageTag::Ping,
            device_id_len: 6,
            payload_len: 4,
            sequence: 0,
        };
        assert_eq!(header.frame_len(), 18);
    }

    #[test]
    fn test_limits() {
        assert_eq!(HEADER_SIZE, 8);
        assert_eq!(MAX_PAYLOAD_SIZE, 65535);
        assert_eq!(MAX_BATCH_SAMPLES, 50);
    }
}
