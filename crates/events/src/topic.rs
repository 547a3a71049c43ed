//! Topic and schema records owned by the topic registry.

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use eventline_core::ResourceId;

/// Per-event-type payload schema registered on a topic.
///
/// Serialized shape matches the topic config file: `eventType`,
/// `jsonSchemaDraft`, `properties`, `required`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub event_type: String,
    /// Schema draft identifier, e.g. `https://json-schema.org/draft/2020-12/schema`.
    pub json_schema_draft: String,
    #[serde(default = "empty_object")]
    pub properties: JsonValue,
    #[serde(default)]
    pub required: Vec<String>,
}

fn empty_object() -> JsonValue {
    json!({})
}

impl Schema {
    pub fn new(
        event_type: impl Into<String>,
        json_schema_draft: impl Into<String>,
        properties: JsonValue,
        required: Vec<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            json_schema_draft: json_schema_draft.into(),
            properties,
            required,
        }
    }

    /// Assemble the full JSON Schema document this record describes.
    pub fn to_document(&self) -> JsonValue {
        json!({
            "$schema": self.json_schema_draft,
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// A registered topic: an ordered event stream under a (tenant, namespace)
/// scope, with its sequence counter and active schema set.
///
/// Serialized shape matches the topic config file layout; `tenantId` and
/// `namespaceId` carry the scope *names* (the `*ResourceId` fields carry the
/// identities).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub resource_id: ResourceId,
    pub tenant_resource_id: ResourceId,
    pub namespace_resource_id: ResourceId,
    pub name: String,
    /// Monotonically non-decreasing publish counter; the last allocated
    /// sequence, 0 before the first publish.
    pub sequence: i64,
    pub schemas: Vec<Schema>,
    pub tenant_id: String,
    pub namespace_id: String,
}

impl Topic {
    /// Event types currently registered on this topic.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(|s| s.event_type.as_str())
    }

    pub fn has_event_type(&self, event_type: &str) -> bool {
        self.schemas.iter().any(|s| s.event_type == event_type)
    }
}
