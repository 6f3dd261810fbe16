//! Error types for the PAN core.

use thiserror::Error;

/// Bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// A publish topic or subscription pattern is malformed.
    #[error("Invalid topic: {0}")]
    InvalidTopic(&'static str),

    /// A request found zero matching subscribers at publish time.
    #[error("No responder for topic: {0}")]
    NoResponder(String),

    /// A request timed out before any responder settled.
    #[error("Request on {topic} timed out after {elapsed_ms} ms")]
    RequestTimeout {
        /// The requested topic.
        topic: String,
        /// Configured timeout that elapsed.
        elapsed_ms: u64,
    },

    /// The request was cancelled before a reply settled.
    #[error("Request cancelled")]
    Cancelled,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A fault raised by a subscribed handler.
///
/// Faults are captured by the router, reported through the observer, and
/// never surfaced to the publisher of an ordinary publish.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerFault(pub String);

impl HandlerFault {
    /// Create a fault from any displayable error.
    #[must_use]
    pub fn new(reason: impl std::fmt::Display) -> Self {
        Self(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BusError::NoResponder("orders.save".into());
        assert_eq!(err.to_string(), "No responder for topic: orders.save");

        let err = BusError::RequestTimeout {
            topic: "orders.save".into(),
            elapsed_ms: 5000,
        };
        assert!(err.to_string().contains("5000"));
    }

    #[test]
    fn test_handler_fault() {
        let fault = HandlerFault::new("boom");
        assert_eq!(fault.to_string(), "boom");
    }
}
