//! The mirror envelope: wire form of a bus message.
//!
//! Envelopes are what crosses the serialization boundary between contexts
//! (tabs, windows, workers). The hop count marks envelopes that already
//! traversed a bridge so peers never re-forward them.

use crate::version::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire form of a bus message plus loop-prevention metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorEnvelope {
    /// Wire version the sending bridge speaks. Envelopes from an
    /// incompatible major version are dropped on receipt.
    pub version: Version,
    /// The literal topic the message was published on.
    pub topic: String,
    /// Structured payload. Must stay within the structured-clone-equivalent
    /// subset; that is exactly what [`serde_json::Value`] models.
    pub payload: Value,
    /// Message id in the originating context.
    pub message_id: u64,
    /// Unix millisecond publish timestamp in the originating context.
    pub timestamp: u64,
    /// Identifier of the originating context.
    pub origin: String,
    /// Whether the receiving context should retain the message.
    pub retain: bool,
    /// Bridge traversal count. `>= 1` means the envelope already crossed a
    /// bridge and must never be forwarded again.
    pub hop_count: u8,
}

impl MirrorEnvelope {
    /// Whether this envelope already traversed a bridge.
    #[must_use]
    pub fn has_hopped(&self) -> bool {
        self.hop_count >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::WIRE_VERSION;
    use serde_json::json;

    fn envelope(hop_count: u8) -> MirrorEnvelope {
        MirrorEnvelope {
            version: WIRE_VERSION,
            topic: "state.theme".into(),
            payload: json!({"theme": "dark"}),
            message_id: 7,
            timestamp: 1_700_000_000_000,
            origin: "ctx-a".into(),
            retain: true,
            hop_count,
        }
    }

    #[test]
    fn test_hop_detection() {
        assert!(!envelope(0).has_hopped());
        assert!(envelope(1).has_hopped());
        assert!(envelope(3).has_hopped());
    }

    #[test]
    fn test_serde_roundtrip() {
        let env = envelope(1);
        let bytes = rmp_serde::to_vec_named(&env).unwrap();
        let back: MirrorEnvelope = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(env, back);
        assert_eq!(back.version, WIRE_VERSION);
    }
}
