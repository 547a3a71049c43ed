//! The ingestion path: schema check, sequence allocation, durable append,
//! dispatcher nudge, projection feed.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use eventline_core::{Error, Result, TopicScope, system};
use eventline_events::{EventId, SchemaValidator};

use crate::dispatcher::Dispatcher;
use crate::event_store::{EventStore, EventWrite};
use crate::projections::ProjectionEngine;
use crate::topics::TopicRegistry;

/// One event to publish.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub topic: String,
    pub event_type: String,
    pub payload: JsonValue,
}

/// Orchestrates publishing within one scope.
///
/// Payloads are validated before any sequence is allocated, so a rejected
/// publish leaves no gap in the topic's numbering. Writes on the system
/// topics additionally feed the projection engine.
pub struct EventPublisher {
    registry: Arc<TopicRegistry>,
    store: Arc<dyn EventStore>,
    validator: Arc<SchemaValidator>,
    dispatcher: Option<Arc<Dispatcher>>,
    projections: Option<Arc<ProjectionEngine>>,
}

impl EventPublisher {
    pub fn new(
        registry: Arc<TopicRegistry>,
        store: Arc<dyn EventStore>,
        validator: Arc<SchemaValidator>,
    ) -> Self {
        Self {
            registry,
            store,
            validator,
            dispatcher: None,
            projections: None,
        }
    }

    /// Nudge this dispatcher after every successful publish.
    pub fn with_dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Feed system-topic writes into this projection engine.
    pub fn with_projections(mut self, projections: Arc<ProjectionEngine>) -> Self {
        self.projections = Some(projections);
        self
    }

    /// Publish a batch of events. Returns the allocated ids in input order.
    pub fn publish(
        &self,
        requests: Vec<PublishRequest>,
        scope: &TopicScope,
    ) -> Result<Vec<EventId>> {
        if requests.is_empty() {
            return Err(Error::invalid_argument("empty publish batch"));
        }

        // Validate everything up front; nothing is allocated or stored until
        // the whole batch is known good.
        for request in &requests {
            if request.event_type.trim().is_empty() {
                return Err(Error::invalid_argument("blank event type"));
            }
            if !self.registry.topic_exists(&request.topic, scope) {
                return Err(Error::topic_not_found(scope.qualified_name(&request.topic)));
            }
            self.validator.validate_event(
                &scope.qualified_name(&request.topic),
                &request.event_type,
                &request.payload,
            )?;
        }

        let now = Utc::now();
        let mut events = Vec::with_capacity(requests.len());
        for request in requests {
            // Allocation and the storage write happen under the same topic
            // lock, so a smaller sequence is always durable before a larger
            // one can be observed.
            let topic = request.topic.clone();
            let event = self.registry.allocate_sequence_with(&topic, scope, |sequence| {
                self.store.store_event(
                    EventWrite {
                        event_id: EventId::in_scope(scope, &request.topic, sequence),
                        timestamp: now,
                        topic: request.topic,
                        event_type: request.event_type,
                        payload: request.payload,
                    },
                    scope,
                )
            })?;
            events.push(event);
        }

        let mut touched: BTreeSet<&str> = BTreeSet::new();
        for event in &events {
            let topic = event.id.topic();
            touched.insert(topic);
            if let Some(projections) = &self.projections
                && system::is_system_topic(scope, topic)
            {
                projections.apply(topic, event);
            }
        }
        if let Some(dispatcher) = &self.dispatcher {
            for topic in touched {
                dispatcher.notify_published(&scope.qualified_name(topic));
            }
        }

        Ok(events.into_iter().map(|e| e.id).collect())
    }
}
