//! Channel abstraction for mirror transports.
//!
//! The core never moves bytes between contexts itself. A transport adapter
//! (browser `BroadcastChannel`, `postMessage`, a socket, ...) implements
//! these traits and the bridge stays transport-agnostic.
//!
//! Channels split into independent halves so the bridge can pump both
//! directions concurrently.

use async_trait::async_trait;
use pan_protocol::{MirrorEnvelope, ProtocolError};
use thiserror::Error;

/// Mirror transport errors.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The channel to the peer context is gone.
    #[error("Mirror channel closed")]
    ChannelClosed,

    /// Failed to hand an envelope to the transport.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Envelope could not cross the serialization boundary.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// A bidirectional channel to one peer context.
pub trait MirrorChannel: Send {
    /// The sending half.
    type Sender: MirrorSender;
    /// The receiving half.
    type Receiver: MirrorReceiver;

    /// Split into independent halves.
    fn split(self) -> (Self::Sender, Self::Receiver);
}

/// The outbound half of a mirror channel.
#[async_trait]
pub trait MirrorSender: Send + Sync {
    /// Serialize and send one envelope to the peer.
    ///
    /// # Errors
    ///
    /// `Protocol` when the envelope cannot be serialized, `ChannelClosed` or
    /// `SendFailed` on transport failure.
    async fn send(&self, envelope: MirrorEnvelope) -> Result<(), MirrorError>;
}

/// The inbound half of a mirror channel.
#[async_trait]
pub trait MirrorReceiver: Send {
    /// Receive the next envelope from the peer.
    ///
    /// Returns `None` when the channel closed cleanly.
    ///
    /// # Errors
    ///
    /// `Protocol` when inbound bytes fail to decode.
    async fn recv(&mut self) -> Result<Option<MirrorEnvelope>, MirrorError>;
}
