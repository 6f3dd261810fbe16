//! # pan-core
//!
//! Topic-based publish/subscribe routing for the PAN (Page Area Network)
//! bus. Decouples independently-developed components so they communicate via
//! named topics and payloads rather than direct references.
//!
//! Building blocks:
//!
//! - **Topic** - Dot-segmented names, wildcard patterns, matching
//! - **Router** - Dispatch engine with retained-message semantics
//! - **SubscriptionRegistry** - Ordered subscription bookkeeping
//! - **RequestCoordinator** - Request/reply correlation with timeout
//! - **Bus** - Facade wiring the pieces together
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────────┐
//! │    Bus      │────▶│   Router    │────▶│ SubscriptionRegistry │
//! └─────────────┘     └─────────────┘     └──────────────────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌────────────────────┐  ┌───────────────┐
//! │ RequestCoordinator │  │ RetainedStore │
//! └────────────────────┘  └───────────────┘
//! ```
//!
//! Delivery is best-effort and in-process: handlers run on the publishing
//! task in deterministic order, with deferred replies settling on spawned
//! tasks. Cross-context mirroring lives in the `pan-mirror` crate.

pub mod bus;
pub mod error;
pub mod message;
pub mod observer;
pub mod registry;
pub mod request;
pub mod retained;
pub mod router;
pub mod topic;

pub use bus::{Bus, BusConfig, SubscriptionHandle};
pub use error::{BusError, HandlerFault};
pub use message::{CorrelationId, Message, MessageId};
pub use observer::{BusObserver, NoopObserver, TracingObserver};
pub use registry::{Handler, Reply, Subscription, SubscriptionId, SubscriptionRegistry};
pub use request::{InflightRequest, RequestConfig, RequestCoordinator};
pub use retained::{RetainedEntry, RetainedStore};
pub use router::{PublishOptions, Router, RouterConfig, RouterStats};
pub use topic::{matches, validate_pattern, validate_topic, Specificity, TopicFilter};
