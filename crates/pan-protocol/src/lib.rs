//! # pan-protocol
//!
//! Wire format for mirroring PAN bus messages across execution contexts.
//!
//! This crate defines the [`MirrorEnvelope`] that crosses the serialization
//! boundary between contexts, its MessagePack codec, and wire versioning.
//!
//! ## Example
//!
//! ```rust
//! use pan_protocol::{codec, MirrorEnvelope, WIRE_VERSION};
//!
//! let envelope = MirrorEnvelope {
//!     version: WIRE_VERSION,
//!     topic: "state.theme".into(),
//!     payload: serde_json::json!({"theme": "dark"}),
//!     message_id: 1,
//!     timestamp: 0,
//!     origin: "ctx-a".into(),
//!     retain: true,
//!     hop_count: 1,
//! };
//!
//! let encoded = codec::encode(&envelope).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(envelope, decoded);
//! ```

pub mod codec;
pub mod envelope;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::MirrorEnvelope;
pub use version::{Version, WIRE_VERSION};
