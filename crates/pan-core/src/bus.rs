//! The bus facade: one object wiring the router, the request coordinator,
//! and the mirror privacy filter.
//!
//! A `Bus` is an explicit, constructible instance with its own lifecycle.
//! The process-wide shared instance is created lazily exactly once behind
//! [`Bus::global`] rather than through implicit global lookup.

use crate::error::BusError;
use crate::observer::BusObserver;
use crate::registry::{Handler, SubscriptionId};
use crate::request::{RequestConfig, RequestCoordinator};
use crate::router::{PublishOptions, Router, RouterConfig};
use crate::topic::TopicFilter;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static GLOBAL: OnceLock<Bus> = OnceLock::new();

/// Bus configuration.
#[derive(Debug, Clone, Default)]
pub struct BusConfig {
    /// Router configuration.
    pub router: RouterConfig,
    /// Request coordination configuration.
    pub request: RequestConfig,
}

/// A topic-based publish/subscribe bus.
pub struct Bus {
    router: Arc<Router>,
    coordinator: RequestCoordinator,
    mirror_filter: TopicFilter,
}

impl Bus {
    /// Create a bus with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with custom configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        let router = Arc::new(Router::with_config(config.router));
        Self::wire(router, config.request)
    }

    /// Create a bus with a custom lifecycle observer.
    #[must_use]
    pub fn with_observer(config: BusConfig, observer: Arc<dyn BusObserver>) -> Self {
        let router = Arc::new(Router::with_observer(config.router, observer));
        Self::wire(router, config.request)
    }

    fn wire(router: Arc<Router>, request: RequestConfig) -> Self {
        let coordinator = RequestCoordinator::with_config(Arc::clone(&router), request);
        Self {
            router,
            coordinator,
            mirror_filter: TopicFilter::allow_all(),
        }
    }

    /// The process-wide shared bus, created lazily on first access.
    pub fn global() -> &'static Bus {
        GLOBAL.get_or_init(Bus::new)
    }

    /// The underlying router, for attaching mirror bridges or direct use.
    #[must_use]
    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    /// The mirror privacy filter shared with attached bridges.
    #[must_use]
    pub fn mirror_filter(&self) -> TopicFilter {
        self.mirror_filter.clone()
    }

    /// Replace the mirror privacy filter. Takes effect immediately for every
    /// attached bridge, in both directions.
    pub fn set_mirror_filter(&self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) {
        self.mirror_filter.set(predicate);
    }

    /// Publish a message.
    ///
    /// # Errors
    ///
    /// `InvalidTopic` when the topic is malformed or contains wildcards.
    pub fn publish(&self, topic: &str, payload: Value) -> Result<usize, BusError> {
        self.router.publish(topic, payload)
    }

    /// Publish a retained message. A null payload clears the retained entry.
    ///
    /// # Errors
    ///
    /// `InvalidTopic` when the topic is malformed or contains wildcards.
    pub fn publish_retained(&self, topic: &str, payload: Value) -> Result<usize, BusError> {
        self.router
            .publish_with(topic, payload, PublishOptions::retained())
    }

    /// Subscribe a handler to a pattern. Retained messages matching the
    /// pattern are replayed before this returns.
    ///
    /// # Errors
    ///
    /// `InvalidTopic` when the pattern is malformed.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> Result<SubscriptionHandle, BusError> {
        let id = self.router.subscribe(pattern, handler)?;
        Ok(SubscriptionHandle {
            router: Arc::clone(&self.router),
            id,
        })
    }

    /// Publish a request and await the first settled reply.
    ///
    /// # Errors
    ///
    /// See [`RequestCoordinator::request`].
    pub async fn request(&self, topic: &str, payload: Value) -> Result<Value, BusError> {
        self.coordinator.request(topic, payload).await
    }

    /// [`request`](Self::request) with an explicit timeout.
    ///
    /// # Errors
    ///
    /// See [`RequestCoordinator::request_with_timeout`].
    pub async fn request_with_timeout(
        &self,
        topic: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        self.coordinator
            .request_with_timeout(topic, payload, timeout)
            .await
    }

    /// The request coordinator, for explicit cancellation or in-flight
    /// request handles.
    #[must_use]
    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// The unsubscribe side of a registered subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    router: Arc<Router>,
    id: SubscriptionId,
}

impl SubscriptionHandle {
    /// The subscription id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the subscription. Idempotent at the router level; returns
    /// whether it still existed.
    pub fn unsubscribe(self) -> bool {
        self.router.unsubscribe(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::registry::Reply;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_bus_publish_subscribe() {
        let bus = Bus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let seen = Arc::clone(&seen);
            bus.subscribe("a.*", move |msg: Arc<Message>| {
                seen.lock().unwrap().push(msg.topic.clone());
                Ok(Reply::None)
            })
            .unwrap()
        };

        bus.publish("a.b", json!(1)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a.b".to_string()]);

        assert!(handle.unsubscribe());
        bus.publish("a.b", json!(2)).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bus_request_roundtrip() {
        let bus = Bus::new();
        bus.subscribe("math.double", |msg: Arc<Message>| {
            let n = msg.payload.as_i64().unwrap_or(0);
            Ok(Reply::value(json!(n * 2)))
        })
        .unwrap();

        let reply = bus.request("math.double", json!(21)).await.unwrap();
        assert_eq!(reply, json!(42));
    }

    #[tokio::test]
    async fn test_bus_retained() {
        let bus = Bus::new();
        bus.publish_retained("state.theme", json!("dark")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.subscribe("state.theme", move |msg: Arc<Message>| {
                seen.lock().unwrap().push(msg.payload.clone());
                Ok(Reply::None)
            })
            .unwrap();
        }
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_global_is_singleton() {
        let a = Bus::global() as *const Bus;
        let b = Bus::global() as *const Bus;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_set_mirror_filter_shared_with_clone() {
        let bus = Bus::new();
        let filter = bus.mirror_filter();
        assert!(filter.allows("private.x"));

        bus.set_mirror_filter(|topic| topic.starts_with("state."));
        assert!(filter.allows("state.theme"));
        assert!(!filter.allows("private.x"));
    }
}
