//! Codec for encoding and decoding mirror envelopes.
//!
//! MessagePack-based serialization with length-prefixed framing, so channel
//! implementations can move envelopes over any byte stream.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::envelope::MirrorEnvelope;

/// Maximum envelope size (4 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 4 * 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Protocol errors that can occur during encoding/decoding.
///
/// An encode failure is the mirror-serialization error surface: it is
/// reported to the observer and never breaks local delivery.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope exceeds maximum size.
    #[error("Envelope size {0} exceeds maximum {MAX_ENVELOPE_SIZE}")]
    EnvelopeTooLarge(usize),

    /// Not enough data to decode an envelope.
    #[error("Incomplete envelope: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode an envelope to bytes.
///
/// The encoded format is:
/// - 4 bytes: Big-endian length prefix
/// - N bytes: MessagePack-encoded envelope
///
/// # Errors
///
/// Returns an error if the envelope is too large or encoding fails.
pub fn encode(envelope: &MirrorEnvelope) -> Result<Bytes, ProtocolError> {
    let payload = rmp_serde::to_vec_named(envelope)?;

    if payload.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::EnvelopeTooLarge(payload.len()));
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);

    Ok(buf.freeze())
}

/// Decode an envelope from bytes.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode(data: &[u8]) -> Result<MirrorEnvelope, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if length > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::EnvelopeTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    let envelope = rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::WIRE_VERSION;
    use serde_json::json;

    fn envelope(topic: &str) -> MirrorEnvelope {
        MirrorEnvelope {
            version: WIRE_VERSION,
            topic: topic.into(),
            payload: json!({"theme": "dark"}),
            message_id: 1,
            timestamp: 1_700_000_000_000,
            origin: "ctx-a".into(),
            retain: false,
            hop_count: 1,
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let env = envelope("state.theme");
        let encoded = encode(&env).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn test_decode_incomplete() {
        let encoded = encode(&envelope("state.theme")).unwrap();

        let partial = &encoded[..5];
        match decode(partial) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_too_large() {
        let mut env = envelope("state.blob");
        env.payload = json!("x".repeat(MAX_ENVELOPE_SIZE + 1));

        match encode(&env) {
            Err(ProtocolError::EnvelopeTooLarge(_)) => {}
            other => panic!("Expected EnvelopeTooLarge error, got {other:?}"),
        }
    }

}
