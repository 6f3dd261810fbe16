//! The dispatch engine for the PAN bus.
//!
//! The router resolves matching subscriptions at the moment of publish,
//! applies retained-message semantics, delivers in deterministic order, and
//! feeds handler replies into the pending-request table when a message
//! carries a correlation id. A broadcast tap over every dispatched message
//! feeds the mirror bridge.

use crate::error::HandlerFault;
use crate::message::{CorrelationId, Message};
use crate::observer::{BusObserver, TracingObserver};
use crate::registry::{Handler, Subscription, SubscriptionId, SubscriptionRegistry};
use crate::request::PendingRequests;
use crate::retained::RetainedStore;
use crate::topic::{validate_pattern, validate_topic};
use crate::BusError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Router configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Identifier of this execution context, stamped onto every locally
    /// published message. Auto-generated when unset.
    pub context_id: Option<String>,
    /// Capacity of the dispatch tap consumed by mirror bridges.
    pub watch_capacity: usize,
}

impl RouterConfig {
    fn watch_capacity(&self) -> usize {
        if self.watch_capacity == 0 {
            1024
        } else {
            self.watch_capacity
        }
    }
}

/// Per-publish options.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Remember this message as the topic's retained entry. A null payload
    /// clears the entry instead.
    pub retain: bool,
}

impl PublishOptions {
    /// Options for a retained publish.
    #[must_use]
    pub fn retained() -> Self {
        Self { retain: true }
    }
}

/// The message-routing and delivery engine.
pub struct Router {
    registry: SubscriptionRegistry,
    retained: RetainedStore,
    pending: Arc<PendingRequests>,
    observer: Arc<dyn BusObserver>,
    watch: broadcast::Sender<Arc<Message>>,
    context: String,
}

impl Router {
    /// Create a router with default configuration and the tracing observer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    /// Create a router with a custom lifecycle observer.
    #[must_use]
    pub fn with_observer(config: RouterConfig, observer: Arc<dyn BusObserver>) -> Self {
        let context = config
            .context_id
            .clone()
            .unwrap_or_else(|| format!("ctx_{:x}", crate::message::generate_id()));
        let (watch, _) = broadcast::channel(config.watch_capacity());
        debug!(context = %context, "Creating router");
        Self {
            registry: SubscriptionRegistry::new(),
            retained: RetainedStore::new(),
            pending: Arc::new(PendingRequests::new()),
            observer,
            watch,
            context,
        }
    }

    /// This router's context identifier.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// The lifecycle observer.
    #[must_use]
    pub fn observer(&self) -> Arc<dyn BusObserver> {
        Arc::clone(&self.observer)
    }

    /// The pending-request table shared with the request coordinator.
    #[must_use]
    pub fn pending(&self) -> Arc<PendingRequests> {
        Arc::clone(&self.pending)
    }

    /// Tap over every message this router dispatches. Mirror bridges consume
    /// this to forward local traffic.
    #[must_use]
    pub fn watch(&self) -> broadcast::Receiver<Arc<Message>> {
        self.watch.subscribe()
    }

    /// Router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            subscription_count: self.registry.len(),
            retained_count: self.retained.len(),
            pending_request_count: self.pending.len(),
        }
    }

    /// Register a handler under a pattern.
    ///
    /// Every currently-retained message whose topic matches the pattern is
    /// replayed to the new handler before this call returns, each as a fresh
    /// retained message preserving the original timestamp.
    ///
    /// # Errors
    ///
    /// `InvalidTopic` when the pattern is malformed.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<SubscriptionId, BusError> {
        self.subscribe_arc(pattern, Arc::new(handler))
    }

    /// [`subscribe`](Self::subscribe) for an already-shared handler.
    ///
    /// # Errors
    ///
    /// `InvalidTopic` when the pattern is malformed.
    pub fn subscribe_arc(
        &self,
        pattern: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<SubscriptionId, BusError> {
        validate_pattern(pattern).map_err(BusError::InvalidTopic)?;

        let subscription = self.registry.subscribe(pattern, handler);
        self.observer.on_subscribe(pattern, subscription.id);

        // Retained replay, before any new publish can reach the subscriber.
        for entry in self.retained.matching(pattern) {
            let replay = Arc::new(entry.message.replay());
            trace!(pattern = %pattern, topic = %replay.topic, "Replaying retained message");
            self.invoke(&subscription, replay);
        }

        Ok(subscription.id)
    }

    /// Remove a subscription. Idempotent; returns whether it existed.
    ///
    /// Safe to call from within the handler's own dispatch: the in-flight
    /// delivery still completes, only future dispatches are affected.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.unsubscribe(id);
        if removed {
            self.observer.on_unsubscribe(id);
        }
        removed
    }

    /// Publish a message. Returns the number of handlers delivered to.
    ///
    /// # Errors
    ///
    /// `InvalidTopic` when the topic is malformed or contains wildcards.
    pub fn publish(&self, topic: &str, payload: Value) -> Result<usize, BusError> {
        self.publish_with(topic, payload, PublishOptions::default())
    }

    /// Publish with options.
    ///
    /// With `retain` set, the message overwrites the topic's retained entry
    /// before delivery; a null payload clears the entry instead.
    ///
    /// # Errors
    ///
    /// `InvalidTopic` when the topic is malformed or contains wildcards.
    pub fn publish_with(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<usize, BusError> {
        validate_topic(topic).map_err(BusError::InvalidTopic)?;
        let message = Message::new(topic, payload, self.context.clone()).retained(options.retain);
        Ok(self.route(Arc::new(message)))
    }

    /// Publish a message carrying a request correlation id. Handler replies
    /// settle the matching pending request, first response wins.
    pub(crate) fn publish_request(
        &self,
        topic: &str,
        payload: Value,
        correlation_id: CorrelationId,
    ) -> Result<usize, BusError> {
        validate_topic(topic).map_err(BusError::InvalidTopic)?;
        let message = Message::new(topic, payload, self.context.clone())
            .with_reply_to(correlation_id);
        Ok(self.route(Arc::new(message)))
    }

    /// Re-publish a message that arrived over a mirror bridge.
    ///
    /// The hop count is clamped to at least 1 so the message is never
    /// forwarded back out, even by a different bridge. Retain semantics are
    /// preserved.
    ///
    /// # Errors
    ///
    /// `InvalidTopic` when the peer sent a malformed topic.
    pub fn publish_mirrored(&self, message: Message) -> Result<usize, BusError> {
        validate_topic(&message.topic).map_err(BusError::InvalidTopic)?;
        let hops = message.hops.max(1);
        Ok(self.route(Arc::new(message.with_hops(hops))))
    }

    /// Exact-topic lookup of the current retained message, if any.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<Arc<Message>> {
        self.retained.get(topic)
    }

    fn route(&self, message: Arc<Message>) -> usize {
        if message.retain {
            if message.is_clear() {
                debug!(topic = %message.topic, "Clearing retained entry");
                self.retained.clear(&message.topic);
            } else {
                self.retained.put(Arc::clone(&message));
            }
        }

        // Snapshot at publish time: later subscribes never see this message.
        let targets = self.registry.matching(&message.topic);

        // Tap for mirror bridges; no receivers is fine.
        let _ = self.watch.send(Arc::clone(&message));

        self.observer
            .on_publish(&message.topic, message.id, targets.len());
        trace!(topic = %message.topic, recipients = targets.len(), "Dispatching");

        for subscription in &targets {
            self.invoke(subscription, Arc::clone(&message));
        }
        targets.len()
    }

    fn invoke(&self, subscription: &Subscription, message: Arc<Message>) {
        use crate::registry::Reply;

        let reply_to = message.reply_to;
        let topic = message.topic.clone();

        match subscription.handler.handle(message) {
            Ok(Reply::None) => {}
            Ok(Reply::Value(value)) => {
                if let Some(correlation_id) = reply_to {
                    self.pending.settle(correlation_id, value);
                }
            }
            Ok(Reply::Deferred(future)) => {
                // Deferred replies settle on a spawned task. Without a
                // runtime the handler counts as faulted; delivery to the
                // remaining handlers continues.
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    let fault = HandlerFault::new("deferred reply with no tokio runtime");
                    self.observer
                        .on_handler_error(&topic, subscription.id, &fault);
                    return;
                };
                let pending = Arc::clone(&self.pending);
                let observer = Arc::clone(&self.observer);
                let subscription_id = subscription.id;
                handle.spawn(async move {
                    match future.await {
                        Ok(value) => {
                            if let Some(correlation_id) = reply_to {
                                pending.settle(correlation_id, value);
                            }
                        }
                        Err(fault) => observer.on_handler_error(&topic, subscription_id, &fault),
                    }
                });
            }
            Err(fault) => {
                // Isolated: delivery to the remaining handlers continues.
                self.observer
                    .on_handler_error(&topic, subscription.id, &fault);
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("context", &self.context)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Router statistics.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Number of active subscriptions.
    pub subscription_count: usize,
    /// Number of topics with a retained entry.
    pub retained_count: usize,
    /// Number of outstanding requests.
    pub pending_request_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Reply;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn collect(into: Arc<Mutex<Vec<Arc<Message>>>>) -> impl Handler {
        move |msg: Arc<Message>| {
            into.lock().unwrap().push(msg);
            Ok(Reply::None)
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        handler_errors: Mutex<Vec<(String, String)>>,
    }

    impl BusObserver for RecordingObserver {
        fn on_handler_error(&self, topic: &str, _subscription_id: u64, fault: &HandlerFault) {
            self.handler_errors
                .lock()
                .unwrap()
                .push((topic.to_string(), fault.to_string()));
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_handler() {
        let router = Router::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        router
            .subscribe("orders.*.save", collect(Arc::clone(&seen)))
            .unwrap();

        let count = router
            .publish("orders.123.save", json!({"id": 123}))
            .unwrap();
        assert_eq!(count, 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].topic, "orders.123.save");
        assert_eq!(*seen[0].payload, json!({"id": 123}));
    }

    #[tokio::test]
    async fn test_publish_rejects_wildcard_topic() {
        let router = Router::new();
        assert!(matches!(
            router.publish("orders.*", json!(null)),
            Err(BusError::InvalidTopic(_))
        ));
        assert!(matches!(
            router.subscribe("a..b", |_msg: Arc<Message>| Ok(Reply::None)),
            Err(BusError::InvalidTopic(_))
        ));
    }

    #[tokio::test]
    async fn test_delivery_order_specificity_then_registration() {
        let router = Router::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (tag, pattern) in [
            ("deep", "orders.**"),
            ("wild", "orders.*.save"),
            ("exact", "orders.1.save"),
        ] {
            let order = Arc::clone(&order);
            router
                .subscribe(pattern, move |_msg: Arc<Message>| {
                    order.lock().unwrap().push(tag);
                    Ok(Reply::None)
                })
                .unwrap();
        }

        router.publish("orders.1.save", json!(null)).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["exact", "wild", "deep"]);
    }

    #[tokio::test]
    async fn test_handler_fault_does_not_abort_delivery() {
        let router = Router::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        router
            .subscribe("a.b", |_msg: Arc<Message>| {
                Err(HandlerFault::new("boom"))
            })
            .unwrap();
        {
            let delivered = Arc::clone(&delivered);
            router
                .subscribe("a.b", move |_msg: Arc<Message>| {
                    delivered.fetch_add(1, Ordering::SeqCst);
                    Ok(Reply::None)
                })
                .unwrap();
        }

        let count = router.publish("a.b", json!(null)).unwrap();
        assert_eq!(count, 2);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retained_replay_on_subscribe() {
        let router = Router::new();
        router
            .publish_with("state.theme", json!({"theme": "dark"}), PublishOptions::retained())
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        router
            .subscribe("state.*", collect(Arc::clone(&seen)))
            .unwrap();

        // Replay arrives synchronously, before any new publish.
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].topic, "state.theme");
        assert!(seen[0].retain);
        assert_eq!(*seen[0].payload, json!({"theme": "dark"}));
    }

    #[tokio::test]
    async fn test_retained_clear_with_null_payload() {
        let router = Router::new();
        router
            .publish_with("state.theme", json!("dark"), PublishOptions::retained())
            .unwrap();
        router
            .publish_with("state.theme", Value::Null, PublishOptions::retained())
            .unwrap();

        assert!(router.retained("state.theme").is_none());

        let seen = Arc::new(Mutex::new(Vec::new()));
        router
            .subscribe("state.theme", collect(Arc::clone(&seen)))
            .unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_during_own_dispatch() {
        let router = Arc::new(Router::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let id_slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let id = {
            let router = Arc::clone(&router);
            let calls = Arc::clone(&calls);
            let id_slot = Arc::clone(&id_slot);
            router
                .clone()
                .subscribe("a.b", move |_msg: Arc<Message>| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let id = id_slot.lock().unwrap().unwrap();
                    router.unsubscribe(id);
                    Ok(Reply::None)
                })
                .unwrap()
        };
        *id_slot.lock().unwrap() = Some(id);

        assert_eq!(router.publish("a.b", json!(null)).unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Removed for subsequent dispatches.
        assert_eq!(router.publish("a.b", json!(null)).unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscribers_added_after_publish_miss_it() {
        let router = Router::new();
        router.publish("a.b", json!(1)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        router.subscribe("a.b", collect(Arc::clone(&seen))).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retain_unsubscribe_resubscribe_scenario() {
        let router = Router::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let id = router
            .subscribe("orders.*.save", collect(Arc::clone(&seen)))
            .unwrap();

        router
            .publish("orders.123.save", json!({"id": 123}))
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);

        router
            .publish_with("orders.123.save", json!({"id": 123}), PublishOptions::retained())
            .unwrap();
        assert!(router.unsubscribe(id));

        let replayed = Arc::new(Mutex::new(Vec::new()));
        router
            .subscribe("orders.*.save", collect(Arc::clone(&replayed)))
            .unwrap();

        let replayed = replayed.lock().unwrap();
        assert_eq!(replayed.len(), 1);
        assert!(replayed[0].retain);
        assert_eq!(*replayed[0].payload, json!({"id": 123}));
    }

    #[tokio::test]
    async fn test_mirrored_message_hops_clamped() {
        let router = Router::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        router.subscribe("a.b", collect(Arc::clone(&seen))).unwrap();

        let inbound = Message::new("a.b", json!(1), "ctx-peer");
        router.publish_mirrored(inbound).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].hops >= 1);
        assert_eq!(seen[0].source, "ctx-peer");
    }

    #[tokio::test]
    async fn test_watch_sees_dispatched_messages() {
        let router = Router::new();
        let mut tap = router.watch();

        router.publish("a.b", json!(1)).unwrap();
        let message = tap.try_recv().unwrap();
        assert_eq!(message.topic, "a.b");
        assert_eq!(message.hops, 0);
    }

    #[tokio::test]
    async fn test_observer_reports_sync_fault() {
        let observer = Arc::new(RecordingObserver::default());
        let router = Router::with_observer(RouterConfig::default(), observer.clone());

        router
            .subscribe("a.b", |_msg: Arc<Message>| Err(HandlerFault::new("boom")))
            .unwrap();
        router.publish("a.b", json!(null)).unwrap();

        let errors = observer.handler_errors.lock().unwrap();
        assert_eq!(*errors, vec![("a.b".to_string(), "boom".to_string())]);
    }

    #[tokio::test]
    async fn test_observer_reports_deferred_rejection() {
        let observer = Arc::new(RecordingObserver::default());
        let router = Router::with_observer(RouterConfig::default(), observer.clone());

        router
            .subscribe("a.b", |_msg: Arc<Message>| {
                Ok(Reply::deferred(async {
                    Err(HandlerFault::new("late boom"))
                }))
            })
            .unwrap();
        router.publish("a.b", json!(null)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let errors = observer.handler_errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].1, "late boom");
    }

    #[test]
    fn test_deferred_without_runtime_does_not_abort_delivery() {
        let observer = Arc::new(RecordingObserver::default());
        let router = Router::with_observer(RouterConfig::default(), observer.clone());
        let delivered = Arc::new(AtomicUsize::new(0));

        router
            .subscribe("a.b", |_msg: Arc<Message>| {
                Ok(Reply::deferred(async { Ok(json!(1)) }))
            })
            .unwrap();
        {
            let delivered = Arc::clone(&delivered);
            router
                .subscribe("a.b", move |_msg: Arc<Message>| {
                    delivered.fetch_add(1, Ordering::SeqCst);
                    Ok(Reply::None)
                })
                .unwrap();
        }

        // Outside a runtime the deferred reply cannot settle; the handler is
        // reported as faulted and the second handler still runs.
        assert_eq!(router.publish("a.b", json!(null)).unwrap(), 2);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        let errors = observer.handler_errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "a.b");
    }

    #[tokio::test]
    async fn test_stats() {
        let router = Router::new();
        router
            .subscribe("a.*", |_msg: Arc<Message>| Ok(Reply::None))
            .unwrap();
        router
            .publish_with("a.b", json!(1), PublishOptions::retained())
            .unwrap();

        let stats = router.stats();
        assert_eq!(stats.subscription_count, 1);
        assert_eq!(stats.retained_count, 1);
        assert_eq!(stats.pending_request_count, 0);
    }
}
