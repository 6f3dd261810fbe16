//! In-process mirror channel.
//!
//! A linked pair of endpoints moving envelopes between two routers in the
//! same process. Envelopes pass through the real wire codec, so tests and
//! demos exercise the serialization boundary exactly like a cross-context
//! transport would.

use crate::traits::{MirrorChannel, MirrorError, MirrorReceiver, MirrorSender};
use async_trait::async_trait;
use bytes::Bytes;
use pan_protocol::{codec, MirrorEnvelope};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default endpoint buffer, in envelopes.
const DEFAULT_CAPACITY: usize = 64;

/// One endpoint of an in-process channel pair.
#[derive(Debug)]
pub struct InProcessChannel {
    sender: InProcessSender,
    receiver: InProcessReceiver,
}

impl InProcessChannel {
    /// Create a linked pair of endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a linked pair with a specific buffer capacity.
    #[must_use]
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel::<Bytes>(capacity);
        let (b_tx, a_rx) = mpsc::channel::<Bytes>(capacity);

        let a = Self {
            sender: InProcessSender {
                tx: a_tx,
                sent: Arc::new(AtomicUsize::new(0)),
            },
            receiver: InProcessReceiver { rx: a_rx },
        };
        let b = Self {
            sender: InProcessSender {
                tx: b_tx,
                sent: Arc::new(AtomicUsize::new(0)),
            },
            receiver: InProcessReceiver { rx: b_rx },
        };
        (a, b)
    }

    /// Counter of envelopes successfully sent from this endpoint.
    #[must_use]
    pub fn sent_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.sender.sent)
    }
}

impl MirrorChannel for InProcessChannel {
    type Sender = InProcessSender;
    type Receiver = InProcessReceiver;

    fn split(self) -> (Self::Sender, Self::Receiver) {
        (self.sender, self.receiver)
    }
}

/// Sending half of an in-process endpoint.
#[derive(Debug, Clone)]
pub struct InProcessSender {
    tx: mpsc::Sender<Bytes>,
    sent: Arc<AtomicUsize>,
}

#[async_trait]
impl MirrorSender for InProcessSender {
    async fn send(&self, envelope: MirrorEnvelope) -> Result<(), MirrorError> {
        let encoded = codec::encode(&envelope)?;
        self.tx
            .send(encoded)
            .await
            .map_err(|_| MirrorError::ChannelClosed)?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Receiving half of an in-process endpoint.
#[derive(Debug)]
pub struct InProcessReceiver {
    rx: mpsc::Receiver<Bytes>,
}

#[async_trait]
impl MirrorReceiver for InProcessReceiver {
    async fn recv(&mut self) -> Result<Option<MirrorEnvelope>, MirrorError> {
        match self.rx.recv().await {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}
