//! In-memory event store.
//!
//! Ordered per-scope lists with the same semantics as the filesystem backend.
//! Used in tests and small deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{FixedOffset, Offset, Utc};

use eventline_core::{Error, Result, TopicScope};
use eventline_events::{Event, EventId};

use super::query::EventQuery;
use super::{EventStore, EventWrite};

pub struct InMemoryEventStore {
    // qualified topic name -> events ordered by sequence
    topics: RwLock<HashMap<String, Vec<Event>>>,
    zone: FixedOffset,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::with_zone(Utc.fix())
    }

    /// Store whose `date` filter evaluates in the given zone.
    pub fn with_zone(zone: FixedOffset) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            zone,
        }
    }

    fn insert_ordered(stream: &mut Vec<Event>, event: Event) {
        // Writes normally arrive in sequence order; recovery paths may not.
        match stream.binary_search_by(|e| e.id.compare(&event.id)) {
            Ok(pos) | Err(pos) => stream.insert(pos, event),
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for InMemoryEventStore {
    fn store_event(&self, write: EventWrite, scope: &TopicScope) -> Result<Event> {
        let key = scope.qualified_name(&write.topic);
        let event = write.into_event();

        let mut topics = self
            .topics
            .write()
            .map_err(|_| Error::storage("event store lock poisoned"))?;
        Self::insert_ordered(topics.entry(key).or_default(), event.clone());

        Ok(event)
    }

    fn store_events(&self, writes: Vec<EventWrite>, scope: &TopicScope) -> Result<Vec<Event>> {
        if writes.is_empty() {
            return Err(Error::invalid_argument("empty event batch"));
        }

        // A single lock acquisition makes the batch atomic here; the cleanup
        // contract only matters for backends that can partially fail.
        let mut topics = self
            .topics
            .write()
            .map_err(|_| Error::storage("event store lock poisoned"))?;

        let mut stored = Vec::with_capacity(writes.len());
        for write in writes {
            let key = scope.qualified_name(&write.topic);
            let event = write.into_event();
            Self::insert_ordered(topics.entry(key).or_default(), event.clone());
            stored.push(event);
        }

        Ok(stored)
    }

    fn get_event(
        &self,
        topic: &str,
        event_id: &EventId,
        scope: &TopicScope,
    ) -> Result<Option<Event>> {
        let topics = self
            .topics
            .read()
            .map_err(|_| Error::storage("event store lock poisoned"))?;

        Ok(topics
            .get(&scope.qualified_name(topic))
            .and_then(|stream| {
                stream
                    .iter()
                    .find(|e| e.id.sequence() == event_id.sequence())
            })
            .cloned())
    }

    fn get_events(
        &self,
        topic: &str,
        query: &EventQuery,
        scope: &TopicScope,
    ) -> Result<Vec<Event>> {
        let topics = self
            .topics
            .read()
            .map_err(|_| Error::storage("event store lock poisoned"))?;

        let Some(stream) = topics.get(&scope.qualified_name(topic)) else {
            return Ok(Vec::new());
        };

        // The stream is already in sequence order, so `limit` is an early
        // exit rather than a buffered sort.
        let mut out = Vec::new();
        for event in stream {
            if !query.matches(event, &self.zone) {
                continue;
            }
            out.push(event.clone());
            if let Some(limit) = query.limit
                && limit > 0
                && out.len() >= limit
            {
                break;
            }
        }

        Ok(out)
    }

    fn get_latest_event_id(&self, topic: &str, scope: &TopicScope) -> Result<Option<EventId>> {
        let topics = self
            .topics
            .read()
            .map_err(|_| Error::storage("event store lock poisoned"))?;

        Ok(topics
            .get(&scope.qualified_name(topic))
            .and_then(|stream| stream.last())
            .map(|e| e.id.clone()))
    }
}
