//! Payload validation against registered topic schemas.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use jsonschema::{Draft, JSONSchema};
use serde_json::Value as JsonValue;

use eventline_core::{Error, Result};

use crate::topic::Schema;

/// Validates event payloads against the per-topic, per-event-type schemas.
///
/// Validation is synchronous and side-effect free; compiled validators are
/// cached and replaced wholesale on registration. Draft 2020-12 semantics.
#[derive(Default)]
pub struct SchemaValidator {
    // qualified topic name -> event type -> compiled validator
    compiled: RwLock<HashMap<String, HashMap<String, Arc<JSONSchema>>>>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active schema set for a topic.
    ///
    /// Every schema needs a nonblank event type and an explicit draft
    /// identifier; a schema that fails to compile rejects the whole call and
    /// leaves the previous set untouched.
    pub fn register_schemas(&self, qualified_topic: &str, schemas: &[Schema]) -> Result<()> {
        let mut next: HashMap<String, Arc<JSONSchema>> = HashMap::with_capacity(schemas.len());

        for schema in schemas {
            if schema.event_type.trim().is_empty() {
                return Err(Error::invalid_argument(format!(
                    "topic {qualified_topic}: schema with blank event type"
                )));
            }
            if schema.json_schema_draft.trim().is_empty() {
                return Err(Error::invalid_argument(format!(
                    "topic {qualified_topic}: schema {} has no draft identifier",
                    schema.event_type
                )));
            }

            let document = schema.to_document();
            let validator = JSONSchema::options()
                .with_draft(Draft::Draft202012)
                .should_validate_formats(true)
                .compile(&document)
                .map_err(|e| {
                    Error::invalid_argument(format!(
                        "topic {qualified_topic}: schema {} does not compile: {e}",
                        schema.event_type
                    ))
                })?;

            next.insert(schema.event_type.clone(), Arc::new(validator));
        }

        self.compiled
            .write()
            .map_err(|_| Error::storage("schema cache lock poisoned"))?
            .insert(qualified_topic.to_string(), next);

        Ok(())
    }

    /// Validate a payload against the schema registered for
    /// (topic, event type). Unknown pairs fail like any other violation.
    pub fn validate_event(
        &self,
        qualified_topic: &str,
        event_type: &str,
        payload: &JsonValue,
    ) -> Result<()> {
        let validator = {
            let compiled = self
                .compiled
                .read()
                .map_err(|_| Error::storage("schema cache lock poisoned"))?;
            compiled
                .get(qualified_topic)
                .and_then(|by_type| by_type.get(event_type))
                .cloned()
        };

        let Some(validator) = validator else {
            return Err(Error::invalid_payload(
                qualified_topic,
                event_type,
                "no schema registered for this event type",
            ));
        };

        if let Err(errors) = validator.validate(payload) {
            let reasons: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(Error::invalid_payload(
                qualified_topic,
                event_type,
                reasons.join("; "),
            ));
        }

        Ok(())
    }

    /// Event types the validator currently knows for a topic.
    pub fn registered_event_types(&self, qualified_topic: &str) -> Vec<String> {
        self.compiled
            .read()
            .map(|compiled| {
                compiled
                    .get(qualified_topic)
                    .map(|by_type| by_type.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}
