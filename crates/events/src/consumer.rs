//! Webhook consumer records owned by the consumer registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use eventline_core::ConsumerId;

use crate::event::EventId;

/// A registered webhook subscriber with per-topic delivery cursors.
///
/// Keys of `topics` are qualified topic names. A `None` cursor means deliver
/// from the beginning; `Some(id)` means deliver events with sequence strictly
/// greater than `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consumer {
    pub id: ConsumerId,
    pub callback_url: String,
    pub topics: BTreeMap<String, Option<EventId>>,
}

impl Consumer {
    /// Build a consumer with a fresh UUIDv4 id.
    pub fn new(
        callback_url: impl Into<String>,
        topics: BTreeMap<String, Option<EventId>>,
    ) -> Self {
        Self {
            id: ConsumerId::new(),
            callback_url: callback_url.into(),
            topics,
        }
    }

    pub fn subscribes_to(&self, qualified_topic: &str) -> bool {
        self.topics.contains_key(qualified_topic)
    }

    pub fn cursor(&self, qualified_topic: &str) -> Option<&EventId> {
        self.topics.get(qualified_topic).and_then(|c| c.as_ref())
    }

    /// Advance the cursor for a topic after a successful delivery.
    pub fn advance_cursor(&mut self, qualified_topic: &str, delivered: EventId) {
        self.topics
            .insert(qualified_topic.to_string(), Some(delivered));
    }
}
