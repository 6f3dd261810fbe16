//! The mirror bridge.
//!
//! Forwards publishable messages between a local router and a peer context
//! over an injected channel, symmetrically in both directions. Peers are
//! equals: loop prevention relies on the envelope hop count, not on any
//! context being authoritative.

use crate::traits::{MirrorChannel, MirrorError, MirrorReceiver, MirrorSender};
use pan_core::message::generate_id;
use pan_core::{Message, Router, TopicFilter};
use pan_protocol::{MirrorEnvelope, WIRE_VERSION};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Bridges a local router to one peer context.
///
/// Outbound, the bridge forwards locally-originated messages passing the
/// topic filter, tagged with `hop_count = 1`. Inbound, it re-publishes peer
/// envelopes into the local router with a hop count that prevents any
/// further forwarding. The filter is re-applied on receipt as a second line
/// of defense against a misbehaving peer.
pub struct MirrorBridge {
    router: Arc<Router>,
    filter: TopicFilter,
    local: broadcast::Receiver<Arc<Message>>,
}

impl MirrorBridge {
    /// Create a bridge that mirrors every topic.
    ///
    /// The local dispatch tap starts here, so messages published between
    /// construction and [`run`](Self::run) are not lost.
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self::with_filter(router, TopicFilter::allow_all())
    }

    /// Create a bridge with a topic privacy filter, applied in both
    /// directions.
    #[must_use]
    pub fn with_filter(router: Arc<Router>, filter: TopicFilter) -> Self {
        let local = router.watch();
        Self {
            router,
            filter,
            local,
        }
    }

    /// Pump both directions until the channel closes.
    ///
    /// # Errors
    ///
    /// Returns an error on unrecoverable transport failure. Serialization
    /// failures are reported through the router's observer and skipped;
    /// local delivery is never affected.
    pub async fn run<C: MirrorChannel>(self, channel: C) -> Result<(), MirrorError> {
        let Self {
            router,
            filter,
            mut local,
        } = self;
        let observer = router.observer();
        let (sender, mut receiver) = channel.split();

        debug!(context = %router.context(), "Mirror bridge running");

        loop {
            tokio::select! {
                dispatched = local.recv() => match dispatched {
                    Ok(message) => {
                        if !Self::forwardable(&message, &filter) {
                            continue;
                        }
                        let envelope = outbound_envelope(&message);
                        match sender.send(envelope).await {
                            Ok(()) => {
                                trace!(topic = %message.topic, "Forwarded to peer");
                            }
                            Err(MirrorError::Protocol(err)) => {
                                observer.on_mirror_error(&message.topic, &err.to_string());
                            }
                            Err(_) => {
                                debug!(context = %router.context(), "Peer channel gone");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Mirror tap lagged; messages not forwarded");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                inbound = receiver.recv() => match inbound {
                    Ok(Some(envelope)) => {
                        if !envelope.version.is_compatible_with(&WIRE_VERSION) {
                            observer.on_mirror_error(
                                &envelope.topic,
                                &format!("incompatible wire version {}", envelope.version),
                            );
                            continue;
                        }
                        // Second line of defense: re-check the filter on
                        // receipt.
                        if !filter.allows(&envelope.topic) {
                            debug!(topic = %envelope.topic, "Dropping filtered inbound envelope");
                            continue;
                        }
                        let topic = envelope.topic.clone();
                        if let Err(err) = router.publish_mirrored(inbound_message(envelope)) {
                            observer.on_mirror_error(&topic, &err.to_string());
                        }
                    }
                    Ok(None) => break,
                    Err(MirrorError::Protocol(err)) => {
                        observer.on_mirror_error("", &err.to_string());
                    }
                    Err(err) => return Err(err),
                },
            }
        }

        debug!(context = %router.context(), "Mirror bridge stopped");
        Ok(())
    }

    /// [`run`](Self::run) on a spawned task.
    pub fn spawn<C>(self, channel: C) -> tokio::task::JoinHandle<Result<(), MirrorError>>
    where
        C: MirrorChannel + 'static,
        C::Sender: 'static,
        C::Receiver: 'static,
    {
        tokio::spawn(self.run(channel))
    }

    fn forwardable(message: &Message, filter: &TopicFilter) -> bool {
        // Never re-forward a message that arrived over a bridge, and keep
        // requests local: their correlation ids mean nothing to a peer.
        message.hops == 0 && message.reply_to.is_none() && filter.allows(&message.topic)
    }
}

impl std::fmt::Debug for MirrorBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorBridge")
            .field("context", &self.router.context())
            .finish_non_exhaustive()
    }
}

fn outbound_envelope(message: &Message) -> MirrorEnvelope {
    MirrorEnvelope {
        version: WIRE_VERSION,
        topic: message.topic.clone(),
        payload: (*message.payload).clone(),
        message_id: message.id,
        timestamp: message.timestamp,
        origin: message.source.clone(),
        retain: message.retain,
        hop_count: 1,
    }
}

fn inbound_message(envelope: MirrorEnvelope) -> Message {
    Message {
        id: generate_id(),
        topic: envelope.topic,
        payload: Arc::new(envelope.payload),
        source: envelope.origin,
        timestamp: envelope.timestamp,
        retain: envelope.retain,
        reply_to: None,
        // Clamped so a forged hop count of zero still cannot loop.
        hops: envelope.hop_count.max(1),
    }
}
