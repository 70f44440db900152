//! # Wire Protocol Module
//!
//! Binary framing for the streaming channel.
//!
//! This module handles:
//! - The fixed 8-byte message header (tag, device id length, payload length, sequence)
//! - Framing and sequence numbering on encode
//! - Validated decoding that never panics on malformed input
//! - CSI sample, batch, JSON and ping/pong payload bodies

pub mod decoder;
pub mod encoder;
pub mod payload;
pub mod protocol;

pub use decoder::{decode_frame, decode_header};
pub use encoder::{encode_frame, WireEncoder};
pub use protocol::{
    MessageTag, WireHeader, WireMessage, HEADER_SIZE, MAX_BATCH_SAMPLES, MAX_PAYLOAD_SIZE,
};
