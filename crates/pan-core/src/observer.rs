//! Lifecycle observer interface.
//!
//! The core performs no direct console output. Instead it emits structured
//! lifecycle events through an injected [`BusObserver`]; the default
//! [`TracingObserver`] forwards them to `tracing`.

use crate::error::HandlerFault;
use crate::message::{CorrelationId, MessageId};
use tracing::{debug, trace, warn};

/// Structured lifecycle events emitted by the router and coordinator.
///
/// All methods have empty defaults so observers implement only what they
/// care about.
pub trait BusObserver: Send + Sync {
    /// A subscription was registered.
    fn on_subscribe(&self, pattern: &str, subscription_id: u64) {
        let _ = (pattern, subscription_id);
    }

    /// A subscription was removed.
    fn on_unsubscribe(&self, subscription_id: u64) {
        let _ = subscription_id;
    }

    /// A message was dispatched.
    fn on_publish(&self, topic: &str, message_id: MessageId, recipients: usize) {
        let _ = (topic, message_id, recipients);
    }

    /// A handler threw or its deferred reply rejected.
    fn on_handler_error(&self, topic: &str, subscription_id: u64, fault: &HandlerFault) {
        let _ = (topic, subscription_id, fault);
    }

    /// A pending request timed out.
    fn on_request_timeout(&self, topic: &str, correlation_id: CorrelationId) {
        let _ = (topic, correlation_id);
    }

    /// A message could not cross the mirror boundary. Local delivery is
    /// unaffected.
    fn on_mirror_error(&self, topic: &str, reason: &str) {
        let _ = (topic, reason);
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BusObserver for NoopObserver {}

/// Default observer: forwards lifecycle events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl BusObserver for TracingObserver {
    fn on_subscribe(&self, pattern: &str, subscription_id: u64) {
        debug!(pattern = %pattern, subscription = subscription_id, "Subscribed");
    }

    fn on_unsubscribe(&self, subscription_id: u64) {
        debug!(subscription = subscription_id, "Unsubscribed");
    }

    fn on_publish(&self, topic: &str, message_id: MessageId, recipients: usize) {
        trace!(topic = %topic, message = message_id, recipients, "Published");
    }

    fn on_handler_error(&self, topic: &str, subscription_id: u64, fault: &HandlerFault) {
        warn!(topic = %topic, subscription = subscription_id, error = %fault, "Handler failed");
    }

    fn on_request_timeout(&self, topic: &str, correlation_id: CorrelationId) {
        warn!(topic = %topic, correlation = correlation_id, "Request timed out");
    }

    fn on_mirror_error(&self, topic: &str, reason: &str) {
        warn!(topic = %topic, reason = %reason, "Mirror forwarding failed");
    }
}
