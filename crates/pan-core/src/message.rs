//! Message types for the PAN bus.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A unique message identifier.
pub type MessageId = u64;

/// A correlation identifier linking a request publish to its reply.
pub type CorrelationId = u64;

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique id.
#[must_use]
pub fn generate_id() -> u64 {
    // Combine timestamp with atomic counter for guaranteed uniqueness
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    timestamp.wrapping_add(counter)
}

/// Current unix time in milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// A message on the bus.
///
/// Immutable once dispatch begins; the payload is shared behind an [`Arc`]
/// so no handler can observe mutation by another.
#[derive(Debug, Clone)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// The literal topic this message was published on.
    pub topic: String,
    /// Structured payload (shared for zero-copy fan-out).
    pub payload: Arc<Value>,
    /// Identifier of the context that originated the message.
    pub source: String,
    /// Unix millisecond timestamp. For retained replay this preserves the
    /// instant the retained message was originally published.
    pub timestamp: u64,
    /// Whether this publish updates the retained entry for the topic.
    pub retain: bool,
    /// Correlation id when this message is a request expecting a reply.
    pub reply_to: Option<CorrelationId>,
    /// Bridge traversal count. `0` means locally originated; anything higher
    /// means the message arrived over a mirror and must not be re-forwarded.
    pub hops: u8,
}

impl Message {
    /// Create a new locally-originated message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Value, source: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            topic: topic.into(),
            payload: Arc::new(payload),
            source: source.into(),
            timestamp: now_millis(),
            retain: false,
            reply_to: None,
            hops: 0,
        }
    }

    /// Mark the message as retained.
    #[must_use]
    pub fn retained(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Attach a request correlation id.
    #[must_use]
    pub fn with_reply_to(mut self, correlation_id: CorrelationId) -> Self {
        self.reply_to = Some(correlation_id);
        self
    }

    /// Set the bridge traversal count.
    #[must_use]
    pub fn with_hops(mut self, hops: u8) -> Self {
        self.hops = hops;
        self
    }

    /// Build the replay copy delivered to a new subscriber: fresh id,
    /// `retain` set, timestamp preserved from the retained original.
    #[must_use]
    pub fn replay(&self) -> Self {
        Self {
            id: generate_id(),
            topic: self.topic.clone(),
            payload: Arc::clone(&self.payload),
            source: self.source.clone(),
            timestamp: self.timestamp,
            retain: true,
            reply_to: None,
            hops: self.hops,
        }
    }

    /// Whether the payload is the null value (a retained publish with a null
    /// payload clears the retained entry).
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.payload.is_null()
    }
}
