//! Error model shared across the engine.

use thiserror::Error;

/// Result type used across the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-level error.
///
/// One taxonomy for every layer: callers match on the kind, not on which
/// component raised it. Read-side resilience (skip-and-log for malformed
/// persisted data) never surfaces here.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input: empty batches, blank event types, bad callback URLs,
    /// schema removal attempts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No topic registered under that (tenant, namespace, name).
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    /// No consumer registered under that id.
    #[error("consumer not found: {0}")]
    ConsumerNotFound(String),

    /// A topic with that (tenant, namespace, name) already exists.
    #[error("topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// The payload failed schema validation, or no schema is registered for
    /// the (topic, event type) pair.
    #[error("invalid event payload for {topic}/{event_type}: {reason}")]
    InvalidEventPayload {
        topic: String,
        event_type: String,
        reason: String,
    },

    /// I/O or serialization failure in the event persistence layer.
    #[error("event storage failure: {0}")]
    Storage(String),

    /// Topic config read/write failure.
    #[error("topic config failure: {0}")]
    Config(String),

    /// Webhook delivery failure: non-2xx, network error, or timeout.
    #[error("webhook delivery failed: {0}")]
    Delivery(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn topic_not_found(name: impl Into<String>) -> Self {
        Self::TopicNotFound(name.into())
    }

    pub fn consumer_not_found(id: impl std::fmt::Display) -> Self {
        Self::ConsumerNotFound(id.to_string())
    }

    pub fn topic_already_exists(name: impl Into<String>) -> Self {
        Self::TopicAlreadyExists(name.into())
    }

    pub fn invalid_payload(
        topic: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidEventPayload {
            topic: topic.into(),
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn config(err: impl std::fmt::Display) -> Self {
        Self::Config(err.to_string())
    }

    pub fn delivery(err: impl std::fmt::Display) -> Self {
        Self::Delivery(err.to_string())
    }
}
