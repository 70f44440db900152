//! # Payload Bodies
//!
//! Typed payloads carried inside wire frames.
//!
//! CSI sample body (little-endian):
//!
//! ```text
//! timestamp u64 | mac [u8; 6] | rssi i8 | channel u16 | n u16 | flags u8
//! | amplitude n × f32 | [phase n × f32] | [x f32 | y f32 | confidence f32]
//! ```
//!
//! `flags` bit 0 marks phase data, bit 1 marks a position estimate.
//! A batch body is `count u16` followed by `count` records of `len u16 | sample body`.
//! Metrics, heartbeat and alert bodies are the JSON documents the HTTP endpoints accept.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::protocol::{MAX_BATCH_SAMPLES, MAX_PAYLOAD_SIZE};
use crate::error::{Result, TelemetryError};
use crate::telemetry::{CsiSample, Document, DocumentRef, Position};

const FLAG_PHASE: u8 = 0x01;
const FLAG_POSITION: u8 = 0x02;

/// Fixed part of a sample body before the float arrays
const SAMPLE_FIXED_SIZE: usize = 8 + 6 + 1 + 2 + 2 + 1;

fn need(buf: &[u8], n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(TelemetryError::Framing(format!(
            "{}: need {} bytes, {} left",
            what,
            n,
            buf.remaining()
        )));
    }
    Ok(())
}

/// Size of a sample body in bytes
pub fn sample_body_len(sample: &CsiSample) -> usize {
    let n = sample.amplitude.len();
    let mut len = SAMPLE_FIXED_SIZE + n * 4;
    if sample.phase.is_some() {
        len += n * 4;
    }
    if sample.position.is_some() {
        len += 12;
    }
    len
}

fn put_sample(out: &mut BytesMut, sample: &CsiSample) -> Result<()> {
    let n = sample.amplitude.len();
    if n > u16::MAX as usize {
        return Err(TelemetryError::PayloadTooLarge {
            len: n,
            limit: u16::MAX as usize,
        });
    }
    if let Some(phase) = &sample.phase {
        if phase.len() != n {
            return Err(TelemetryError::InvalidArgument(format!(
                "phase has {} values, amplitude has {}",
                phase.len(),
                n
            )));
        }
    }

    let mut flags = 0u8;
    if sample.phase.is_some() {
        flags |= FLAG_PHASE;
    }
    if sample.position.is_some() {
        flags |= FLAG_POSITION;
    }

    out.put_u64_le(sample.timestamp_us);
    out.put_slice(&sample.mac);
    out.put_i8(sample.rssi);
    out.put_u16_le(sample.channel);
    out.put_u16_le(n as u16);
    out.put_u8(flags);
    for &a in &sample.amplitude {
        out.put_f32_le(a);
    }
    if let Some(phase) = &sample.phase {
        for &p in phase {
            out.put_f32_le(p);
        }
    }
    if let Some(pos) = sample.position {
        out.put_f32_le(pos.x);
        out.put_f32_le(pos.y);
        out.put_f32_le(pos.confidence);
    }
    Ok(())
}

/// Encode one sample as a `CsiData` body
pub fn encode_sample(sample: &CsiSample) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(sample_body_len(sample));
    put_sample(&mut out, sample)?;
    Ok(out.freeze())
}

fn read_floats(buf: &mut &[u8], n: usize) -> Vec<f32> {
    (0..n).map(|_| buf.get_f32_le()).collect()
}

/// Decode a `CsiData` body
///
/// # Errors
///
/// Returns `Framing` on short input, unknown flag bits or trailing bytes
pub fn decode_sample(body: &[u8]) -> Result<CsiSample> {
    let mut buf = body;
    need(buf, SAMPLE_FIXED_SIZE, "CSI sample header")?;

    let timestamp_us = buf.get_u64_le();
    let mut mac = [0u8; 6];
    buf.copy_to_slice(&mut mac);
    let rssi = buf.get_i8();
    let channel = buf.get_u16_le();
    let n = buf.get_u16_le() as usize;
    let flags = buf.get_u8();

    if flags & !(FLAG_PHASE | FLAG_POSITION) != 0 {
        return Err(TelemetryError::Framing(format!("Unknown CSI flags: 0x{:02X}", flags)));
    }

    need(buf, n * 4, "CSI amplitude")?;
    let amplitude = read_floats(&mut buf, n);

    let phase = if flags & FLAG_PHASE != 0 {
        need(buf, n * 4, "CSI phase")?;
        Some(read_floats(&mut buf, n))
    } else {
        None
    };

    let position = if flags & FLAG_POSITION != 0 {
        need(buf, 12, "CSI position")?;
        Some(Position {
            x: buf.get_f32_le(),
            y: buf.get_f32_le(),
            confidence: buf.get_f32_le(),
        })
    } else {
        None
    };

    if buf.has_remaining() {
        return Err(TelemetryError::Framing(format!(
            "CSI sample has {} trailing bytes",
            buf.remaining()
        )));
    }

    Ok(CsiSample {
        timestamp_us,
        mac,
        rssi,
        channel,
        amplitude,
        phase,
        position,
    })
}

/// Encode 1-50 samples as a `BatchCsi` body
///
/// # Errors
///
/// - `InvalidArgument` for an empty batch or more than 50 samples
/// - `PayloadTooLarge` if a single record exceeds its 16-bit length prefix
pub fn encode_batch(samples: &[CsiSample]) -> Result<Bytes> {
    if samples.is_empty() || samples.len() > MAX_BATCH_SAMPLES {
        return Err(TelemetryError::InvalidArgument(format!(
            "batch must hold 1..={} samples, got {}",
            MAX_BATCH_SAMPLES,
            samples.len()
        )));
    }

    let total: usize = samples.iter().map(|s| 2 + sample_body_len(s)).sum();
    let mut out = BytesMut::with_capacity(2 + total);
    out.put_u16_le(samples.len() as u16);

    for sample in samples {
        let len = sample_body_len(sample);
        if len > MAX_PAYLOAD_SIZE {
            return Err(TelemetryError::PayloadTooLarge {
                len,
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        out.put_u16_le(len as u16);
        put_sample(&mut out, sample)?;
    }

    Ok(out.freeze())
}

/// Subcarriers in the largest sample a batch is sized for
pub const SIZING_SUBCARRIERS: usize = 64;

/// `BatchCsi` body length for `count` samples of [`SIZING_SUBCARRIERS`]
/// carrying phase and position
pub fn sizing_batch_len(count: usize) -> usize {
    let record = 2 + SAMPLE_FIXED_SIZE + SIZING_SUBCARRIERS * 8 + 12;
    2 + count * record
}

/// Split samples into runs whose `BatchCsi` bodies fit `limit` bytes
///
/// Each run holds at most 50 samples. A sample too large to fit on its own
/// still gets a run of one, so the encoder reports it.
pub fn split_batch(samples: &[CsiSample], limit: usize) -> Vec<&[CsiSample]> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut body = 2;

    for (i, sample) in samples.iter().enumerate() {
        let record = 2 + sample_body_len(sample);
        let full = i - start == MAX_BATCH_SAMPLES || body + record > limit;
        if i > start && full {
            runs.push(&samples[start..i]);
            start = i;
            body = 2;
        }
        body += record;
    }
    if start < samples.len() {
        runs.push(&samples[start..]);
    }
    runs
}

/// Decode a `BatchCsi` body
pub fn decode_batch(body: &[u8]) -> Result<Vec<CsiSample>> {
    let mut buf = body;
    need(buf, 2, "batch count")?;
    let count = buf.get_u16_le() as usize;
    if count == 0 || count > MAX_BATCH_SAMPLES {
        return Err(TelemetryError::Framing(format!("Invalid batch count: {}", count)));
    }

    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        need(buf, 2, "batch record length")?;
        let len = buf.get_u16_le() as usize;
        need(buf, len, "batch record")?;
        samples.push(decode_sample(&buf[..len])?);
        buf.advance(len);
    }

    if buf.has_remaining() {
        return Err(TelemetryError::Framing(format!(
            "Batch has {} trailing bytes",
            buf.remaining()
        )));
    }
    Ok(samples)
}

/// Encode a record as a JSON document tagged with the device id
pub fn encode_json<T: Serialize>(device_id: &str, body: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&DocumentRef { device_id, body })?)
}

/// Decode a JSON document body, mapping parse failures to `Framing`
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<Document<T>> {
    serde_json::from_slice(body)
        .map_err(|e| TelemetryError::Framing(format!("Invalid JSON body: {}", e)))
}

/// Encode a ping/pong nonce
pub fn encode_nonce(nonce: u32) -> [u8; 4] {
    nonce.to_le_bytes()
}

/// Decode a ping/pong nonce
pub fn decode_nonce(body: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = body.try_into().map_err(|_| {
        TelemetryError::Framing(format!("Nonce must be 4 bytes, got {}", body.len()))
    })?;
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Alert, AlertLevel};

    fn sample(i: u16) -> CsiSample {
        CsiSample::new(
            1_000_000 + i as u64,
            [0x24, 0x6F, 0x28, 0x00, 0x00, i as u8],
            -40 - (i % 30) as i8,
            1 + i % 13,
            (0..64).map(|k| k as f32 * 0.5).collect(),
        )
    }

    #[test]
    fn test_sample_roundtrip_minimal() {
        let s = sample(3);
        let body = encode_sample(&s).unwrap();
        assert_eq!(body.len(), sample_body_len(&s));
        assert_eq!(decode_sample(&body).unwrap(), s);
    }

    #[test]
    fn test_sample_roundtrip_with_phase_and_position() {
        let mut s = sample(9);
        s.phase = Some((0..64).map(|k| -(k as f32) * 0.01).collect());
        s.position = Some(Position { x: 2.0, y: 3.5, confidence: 0.9 });

        let body = encode_sample(&s).unwrap();
        assert_eq!(body.len(), SAMPLE_FIXED_SIZE + 64 * 8 + 12);
        assert_eq!(decode_sample(&body).unwrap(), s);
    }

    #[test]
    fn test_sample_phase_length_mismatch_rejected() {
        let mut s = sample(1);
        s.phase = Some(vec![0.0; 10]);
        assert!(matches!(encode_sample(&s), Err(TelemetryError::InvalidArgument(_))));
    }

    #[test]
    fn test_decode_sample_truncated() {
        let body = encode_sample(&sample(1)).unwrap();
        for len in [0, 5, SAMPLE_FIXED_SIZE, body.len() - 1] {
            assert!(matches!(decode_sample(&body[..len]), Err(TelemetryError::Framing(_))));
        }
    }

    #[test]
    fn test_decode_sample_unknown_flags() {
        let mut body = encode_sample(&sample(1)).unwrap().to_vec();
        body[SAMPLE_FIXED_SIZE - 1] = 0x80;
        assert!(matches!(decode_sample(&body), Err(TelemetryError::Framing(_))));
    }

    #[test]
    fn test_batch_counts() {
        for n in [1usize, 2, 25, 50] {
            let samples: Vec<_> = (0..n as u16).map(sample).collect();
            let body = encode_batch(&samples).unwrap();
            let decoded = decode_batch(&body).unwrap();
            assert_eq!(decoded.len(), n);
            assert_eq!(decoded, samples);
        }
    }

    #[test]
    fn test_batch_rejects_empty_and_oversized() {
        assert!(matches!(encode_batch(&[]), Err(TelemetryError::InvalidArgument(_))));

        let samples: Vec<_> = (0..51).map(sample).collect();
        assert!(matches!(encode_batch(&samples), Err(TelemetryError::InvalidArgument(_))));
    }

    #[test]
    fn test_split_batch_respects_count_and_size() {
        let samples: Vec<CsiSample> = (0..60).map(sample).collect();

        let runs = split_batch(&samples, 16362);
        assert_eq!(runs.iter().map(|r| r.len()).collect::<Vec<_>>(), vec![50, 10]);

        // 278 bytes per record: three fit in 1000, four do not
        let runs = split_batch(&samples[..10], 1000);
        assert_eq!(runs.iter().map(|r| r.len()).collect::<Vec<_>>(), vec![3, 3, 3, 1]);
        for run in &runs {
            assert!(encode_batch(run).unwrap().len() <= 1000);
        }
        assert_eq!(runs.concat(), samples[..10].to_vec());
    }

    #[test]
    fn test_sizing_batch_matches_encoded_len() {
        let mut s = CsiSample::new(1, [0; 6], -50, 6, vec![1.0; SIZING_SUBCARRIERS]);
        s.phase = Some(vec![0.5; SIZING_SUBCARRIERS]);
        s.position = Some(Position { x: 1.0, y: 2.0, confidence: 0.5 });
        let batch = vec![s; 3];
        assert_eq!(encode_batch(&batch).unwrap().len(), sizing_batch_len(3));
    }

    #[test]
    fn test_split_batch_isolates_oversized_sample() {
        let samples: Vec<CsiSample> = (0..3).map(sample).collect();
        let runs = split_batch(&samples, 100);
        assert_eq!(runs.len(), 3);
        assert!(split_batch(&[], 100).is_empty());
    }

    #[test]
    fn test_decode_batch_bad_count() {
        assert!(decode_batch(&[0, 0]).is_err());
        assert!(decode_batch(&[51, 0]).is_err());
        // Declares two records but carries one
        let mut body = encode_batch(&[sample(1)]).unwrap().to_vec();
        body[0] = 2;
        assert!(matches!(decode_batch(&body), Err(TelemetryError::Framing(_))));
    }

    #[test]
    fn test_json_document_roundtrip() {
        let alert = Alert::new(AlertLevel::Warning, "wifi", "RSSI below -80 dBm", 42);
        let body = encode_json("node-3", &alert).unwrap();
        let doc: Document<Alert> = decode_json(&body).unwrap();
        assert_eq!(doc.device_id, "node-3");
        assert_eq!(doc.body, alert);
    }

    #[test]
    fn test_decode_json_garbage_is_framing_error() {
        let result: Result<Document<Alert>> = decode_json(b"{not json");
        assert!(matches!(result, Err(TelemetryError::Framing(_))));
    }

    #[test]
    fn test_nonce() {
        assert_eq!(decode_nonce(&encode_nonce(0xCAFE_BABE)).unwrap(), 0xCAFE_BABE);
        assert!(decode_nonce(&[1, 2, 3]).is_err());
        assert!(decode_nonce(&[1, 2, 3, 4, 5]).is_err());
    }
}
