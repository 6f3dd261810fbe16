//! Request/reply correlation.
//!
//! A request is a publish carrying a correlation id. Whatever matching
//! handler settles first, immediately or via a deferred reply, resolves
//! the pending request; every later settlement for the same id is a silent
//! no-op. Zero matching handlers fail the request immediately, without
//! waiting out the timeout.

use crate::error::BusError;
use crate::message::{generate_id, now_millis, CorrelationId};
use crate::observer::BusObserver;
use crate::router::Router;
use crate::topic::validate_topic;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Request coordination configuration.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Timeout applied when the caller does not pass one explicitly.
    pub default_timeout: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
        }
    }
}

struct PendingEntry {
    reply: oneshot::Sender<Value>,
    topic: String,
    created_at: u64,
}

/// Outstanding request state, shared between the router (which settles) and
/// the coordinator (which registers and expires).
#[derive(Default)]
pub struct PendingRequests {
    entries: DashMap<CorrelationId, PendingEntry>,
}

impl PendingRequests {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no requests are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a pending request, returning the receiver its reply will
    /// arrive on.
    pub fn register(&self, correlation_id: CorrelationId, topic: &str) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            correlation_id,
            PendingEntry {
                reply: tx,
                topic: topic.to_string(),
                created_at: now_millis(),
            },
        );
        rx
    }

    /// Resolve a pending request with the first settled reply.
    ///
    /// Returns `false` when the request already reached a terminal state
    /// (resolved, timed out, or cancelled); late settlements are discarded
    /// silently.
    pub fn settle(&self, correlation_id: CorrelationId, value: Value) -> bool {
        match self.entries.remove(&correlation_id) {
            Some((_, entry)) => {
                trace!(
                    correlation = correlation_id,
                    topic = %entry.topic,
                    elapsed_ms = now_millis().saturating_sub(entry.created_at),
                    "Request settled"
                );
                entry.reply.send(value).is_ok()
            }
            None => false,
        }
    }

    /// Drop a pending request without resolving it. The waiting side
    /// observes the dropped sender.
    pub fn discard(&self, correlation_id: CorrelationId) -> bool {
        self.entries.remove(&correlation_id).is_some()
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("len", &self.len())
            .finish()
    }
}

/// Turns a publish into an awaited reply.
pub struct RequestCoordinator {
    router: Arc<Router>,
    pending: Arc<PendingRequests>,
    config: RequestConfig,
}

impl RequestCoordinator {
    /// Create a coordinator over a router.
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self::with_config(router, RequestConfig::default())
    }

    /// Create a coordinator with custom configuration.
    #[must_use]
    pub fn with_config(router: Arc<Router>, config: RequestConfig) -> Self {
        let pending = router.pending();
        Self {
            router,
            pending,
            config,
        }
    }

    /// Publish a request and await the first settled reply, with the default
    /// timeout.
    ///
    /// # Errors
    ///
    /// `InvalidTopic` for a malformed topic, `NoResponder` when zero
    /// subscriptions match at publish time, `RequestTimeout` when the
    /// deadline elapses first.
    pub async fn request(&self, topic: &str, payload: Value) -> Result<Value, BusError> {
        self.begin(topic, payload, self.config.default_timeout)?
            .wait()
            .await
    }

    /// [`request`](Self::request) with an explicit timeout.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn request_with_timeout(
        &self,
        topic: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        self.begin(topic, payload, timeout)?.wait().await
    }

    /// Publish a request and hand back its in-flight state, for callers that
    /// need the correlation id or explicit cancellation.
    ///
    /// # Errors
    ///
    /// `InvalidTopic` for a malformed topic, `NoResponder` when zero
    /// subscriptions match at publish time.
    pub fn begin(
        &self,
        topic: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<InflightRequest, BusError> {
        validate_topic(topic).map_err(BusError::InvalidTopic)?;

        let correlation_id = generate_id();
        // Register before publishing: a handler may settle synchronously
        // during dispatch.
        let reply = self.pending.register(correlation_id, topic);

        let delivered = self.router.publish_request(topic, payload, correlation_id)?;
        if delivered == 0 {
            self.pending.discard(correlation_id);
            debug!(topic = %topic, "Request with no responder");
            return Err(BusError::NoResponder(topic.to_string()));
        }

        Ok(InflightRequest {
            correlation_id,
            topic: topic.to_string(),
            timeout,
            reply,
            pending: Arc::clone(&self.pending),
            observer: self.router.observer(),
        })
    }

    /// Cancel an outstanding request by correlation id.
    ///
    /// The waiting side rejects with `Cancelled`; any later handler
    /// settlement becomes a no-op. Returns whether the request was still
    /// pending.
    pub fn cancel(&self, correlation_id: CorrelationId) -> bool {
        self.pending.discard(correlation_id)
    }
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("pending", &self.pending.len())
            .field("config", &self.config)
            .finish()
    }
}

/// A request that has been published and not yet settled.
pub struct InflightRequest {
    correlation_id: CorrelationId,
    topic: String,
    timeout: Duration,
    reply: oneshot::Receiver<Value>,
    pending: Arc<PendingRequests>,
    observer: Arc<dyn BusObserver>,
}

impl InflightRequest {
    /// The correlation id linking this request to its reply.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// The requested topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Await the first settled reply, bounded by the request timeout.
    ///
    /// # Errors
    ///
    /// `RequestTimeout` when the deadline elapses, `Cancelled` when the
    /// request was cancelled out from under the waiter.
    pub async fn wait(self) -> Result<Value, BusError> {
        match tokio::time::timeout(self.timeout, self.reply).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(BusError::Cancelled),
            Err(_) => {
                // Remove the entry so a late settlement is a silent no-op.
                self.pending.discard(self.correlation_id);
                self.observer
                    .on_request_timeout(&self.topic, self.correlation_id);
                Err(BusError::RequestTimeout {
                    topic: self.topic,
                    elapsed_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Reject the request immediately. Any later handler settlement for this
    /// correlation id is discarded.
    pub fn cancel(self) {
        self.pending.discard(self.correlation_id);
    }
}

impl std::fmt::Debug for InflightRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InflightRequest")
            .field("correlation_id", &self.correlation_id)
            .field("topic", &self.topic)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
