//! Retained message storage.
//!
//! Holds the single latest retained message per exact topic, replayed to new
//! subscribers whose pattern matches. Wildcard replay scans the stored exact
//! topics; nothing is ever stored under a pattern.

use crate::message::Message;
use crate::topic;
use dashmap::DashMap;
use std::sync::Arc;

/// A retained entry: the latest retained message on one exact topic.
#[derive(Debug, Clone)]
pub struct RetainedEntry {
    /// The retained message.
    pub message: Arc<Message>,
    /// Unix millisecond instant the message was retained.
    pub since: u64,
}

/// Keyed store of the last retained payload per exact topic.
#[derive(Debug, Default)]
pub struct RetainedStore {
    entries: DashMap<String, RetainedEntry>,
}

impl RetainedStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrite the retained entry for the message's exact topic.
    pub fn put(&self, message: Arc<Message>) {
        let since = message.timestamp;
        self.entries
            .insert(message.topic.clone(), RetainedEntry { message, since });
    }

    /// Exact-topic lookup.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<Arc<Message>> {
        self.entries.get(topic).map(|e| Arc::clone(&e.message))
    }

    /// Remove the retained entry for a topic. Returns whether one existed.
    pub fn clear(&self, topic: &str) -> bool {
        self.entries.remove(topic).is_some()
    }

    /// Retained entries whose exact topic matches a pattern, for replay to a
    /// new subscriber. Ordered by topic for determinism.
    #[must_use]
    pub fn matching(&self, pattern: &str) -> Vec<RetainedEntry> {
        let mut matched: Vec<RetainedEntry> = self
            .entries
            .iter()
            .filter(|entry| topic::matches(pattern, entry.key()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by(|a, b| a.message.topic.cmp(&b.message.topic));
        matched
    }
}
