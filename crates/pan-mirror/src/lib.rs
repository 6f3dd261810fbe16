//! # pan-mirror
//!
//! Cross-context mirroring for the PAN bus.
//!
//! A [`MirrorBridge`] taps a local router's publish path and exchanges
//! envelopes with a peer context over an injected [`MirrorChannel`]. Topic
//! filtering applies in both directions and a hop count on every envelope
//! prevents feedback loops between symmetric peers.
//!
//! ```rust,ignore
//! use pan_core::{Router, TopicFilter};
//! use pan_mirror::{InProcessChannel, MirrorBridge};
//!
//! let (here, there) = InProcessChannel::pair();
//! let bridge = MirrorBridge::with_filter(router, TopicFilter::patterns(vec!["state.*".into()]));
//! tokio::spawn(bridge.run(here));
//! ```
//!
//! The physical transport between browser contexts (`BroadcastChannel`,
//! `postMessage`, sockets) lives behind the channel traits; the
//! [`InProcessChannel`] pair included here moves envelopes through the real
//! wire codec for tests and demos.

pub mod bridge;
pub mod inproc;
pub mod traits;

pub use bridge::MirrorBridge;
pub use inproc::{InProcessChannel, InProcessReceiver, InProcessSender};
pub use traits::{MirrorChannel, MirrorError, MirrorReceiver, MirrorSender};
