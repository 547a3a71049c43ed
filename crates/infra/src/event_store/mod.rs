//! Append-only event storage boundary.
//!
//! Two backends with identical semantics: an ordered in-memory store for
//! tests/dev and the hierarchical filesystem store for production. Writes for
//! a single topic are externally serialized by the topic registry's sequence
//! lock; writes across topics may run concurrently.

pub mod filesystem;
pub mod memory;
pub mod query;

pub use filesystem::FileSystemEventStore;
pub use memory::InMemoryEventStore;
pub use query::EventQuery;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use eventline_core::{Result, TopicScope};
use eventline_events::{Event, EventId};

/// An event carrying its pre-allocated id, ready to persist.
///
/// The id must come from the topic registry's `get_and_increment_sequence`;
/// the store never allocates sequences itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EventWrite {
    pub topic: String,
    pub event_type: String,
    pub payload: JsonValue,
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
}

impl EventWrite {
    pub fn into_event(self) -> Event {
        Event::new(self.event_id, self.timestamp, self.event_type, self.payload)
    }
}

/// Durable, ordered, per-(tenant, namespace, topic) event log.
pub trait EventStore: Send + Sync {
    /// Persist one event atomically.
    fn store_event(&self, write: EventWrite, scope: &TopicScope) -> Result<Event>;

    /// Persist a batch. Best-effort: on failure, events already persisted in
    /// this batch are cleaned up before the error surfaces. Empty input is
    /// rejected.
    fn store_events(&self, writes: Vec<EventWrite>, scope: &TopicScope) -> Result<Vec<Event>>;

    /// Point lookup. Malformed persisted data is logged and surfaced as
    /// `None`.
    fn get_event(&self, topic: &str, event_id: &EventId, scope: &TopicScope)
    -> Result<Option<Event>>;

    /// Filtered retrieval, strictly ordered by sequence.
    fn get_events(&self, topic: &str, query: &EventQuery, scope: &TopicScope)
    -> Result<Vec<Event>>;

    /// Id of the newest event on the topic, if any.
    fn get_latest_event_id(&self, topic: &str, scope: &TopicScope) -> Result<Option<EventId>>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn store_event(&self, write: EventWrite, scope: &TopicScope) -> Result<Event> {
        (**self).store_event(write, scope)
    }

    fn store_events(&self, writes: Vec<EventWrite>, scope: &TopicScope) -> Result<Vec<Event>> {
        (**self).store_events(writes, scope)
    }

    fn get_event(
        &self,
        topic: &str,
        event_id: &EventId,
        scope: &TopicScope,
    ) -> Result<Option<Event>> {
        (**self).get_event(topic, event_id, scope)
    }

    fn get_events(
        &self,
        topic: &str,
        query: &EventQuery,
        scope: &TopicScope,
    ) -> Result<Vec<Event>> {
        (**self).get_events(topic, query, scope)
    }

    fn get_latest_event_id(&self, topic: &str, scope: &TopicScope) -> Result<Option<EventId>> {
        (**self).get_latest_event_id(topic, scope)
    }
}
