//! Subscription bookkeeping.
//!
//! The registry owns active subscriptions and resolves which of them match a
//! published topic. Lookup produces a snapshot: subscriptions added or
//! removed while a dispatch is iterating never affect that dispatch.

use crate::error::HandlerFault;
use crate::message::{now_millis, Message};
use crate::topic::{self, Specificity};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A unique subscription identifier. Monotonic within a registry, so it also
/// encodes registration order.
pub type SubscriptionId = u64;

/// The outcome a handler produces for one delivered message.
pub enum Reply {
    /// The handler does not answer. For requests this means some other
    /// responder (or the timeout) settles the pending request.
    None,
    /// An immediate reply value.
    Value(Value),
    /// A reply that settles later.
    Deferred(BoxFuture<'static, Result<Value, HandlerFault>>),
}

impl Reply {
    /// Convenience constructor for an immediate reply.
    #[must_use]
    pub fn value(value: Value) -> Self {
        Reply::Value(value)
    }

    /// Convenience constructor for a deferred reply.
    #[must_use]
    pub fn deferred(
        future: impl std::future::Future<Output = Result<Value, HandlerFault>> + Send + 'static,
    ) -> Self {
        Reply::Deferred(Box::pin(future))
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::None => f.write_str("Reply::None"),
            Reply::Value(v) => write!(f, "Reply::Value({v})"),
            Reply::Deferred(_) => f.write_str("Reply::Deferred(..)"),
        }
    }
}

/// A subscribed message handler.
///
/// Synchronous and asynchronous handlers are modeled uniformly: a handler
/// either fails fast, answers immediately, answers later via
/// [`Reply::Deferred`], or declines with [`Reply::None`]. The router always
/// awaits a settlement point rather than branching on handler shape.
pub trait Handler: Send + Sync {
    /// Handle one delivered message.
    ///
    /// # Errors
    ///
    /// A returned fault is captured by the router and reported through the
    /// observer; it never aborts delivery to other handlers.
    fn handle(&self, message: Arc<Message>) -> Result<Reply, HandlerFault>;
}

impl<F> Handler for F
where
    F: Fn(Arc<Message>) -> Result<Reply, HandlerFault> + Send + Sync,
{
    fn handle(&self, message: Arc<Message>) -> Result<Reply, HandlerFault> {
        self(message)
    }
}

/// An active subscription.
pub struct Subscription {
    /// Unique id, monotonic in registration order.
    pub id: SubscriptionId,
    /// The pattern this subscription listens on.
    pub pattern: String,
    /// Cached specificity rank of the pattern.
    pub specificity: Specificity,
    /// Unix millisecond registration timestamp.
    pub registered_at: u64,
    /// The handler, shared with the registering caller.
    pub handler: Arc<dyn Handler>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("specificity", &self.specificity)
            .finish_non_exhaustive()
    }
}

/// Bookkeeping of active subscriptions.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: DashMap<SubscriptionId, Arc<Subscription>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Register a handler under a pattern. Always succeeds; the caller is
    /// responsible for validating the pattern first.
    pub fn subscribe(
        &self,
        pattern: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Arc<Subscription> {
        let pattern = pattern.into();
        let subscription = Arc::new(Subscription {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            specificity: Specificity::of(&pattern),
            pattern,
            registered_at: now_millis(),
            handler,
        });
        self.subscriptions
            .insert(subscription.id, Arc::clone(&subscription));
        subscription
    }

    /// Remove a subscription by id.
    ///
    /// Idempotent; returns whether it existed. Safe to call from within the
    /// handler's own dispatch: removal affects future dispatches only,
    /// because lookup snapshots.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Snapshot of subscriptions matching a topic, ordered by ascending
    /// specificity rank then registration order.
    #[must_use]
    pub fn matching(&self, topic: &str) -> Vec<Arc<Subscription>> {
        let mut matched: Vec<Arc<Subscription>> = self
            .subscriptions
            .iter()
            .filter(|entry| topic::matches(&entry.pattern, topic))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        matched.sort_by_key(|s| (s.specificity, s.id));
        matched
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("len", &self.len())
            .finish()
    }
}
