//! Namespace read model projected from the `namespaces` system topic.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventline_core::ResourceId;
use eventline_events::Event;
use eventline_events::system::{NamespaceCreated, NamespaceDeleted, NamespaceUpdated, types};

/// Namespace read model, unique per (tenantName, name) and per
/// (tenantResourceId, resourceId).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub resource_id: ResourceId,
    pub tenant_resource_id: ResourceId,
    pub tenant_name: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl Namespace {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Default)]
struct NamespaceState {
    by_id: HashMap<(ResourceId, ResourceId), Namespace>,
    by_name: HashMap<(String, String), (ResourceId, ResourceId)>,
}

#[derive(Default)]
pub struct NamespaceProjection {
    state: Mutex<NamespaceState>,
}

impl NamespaceProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &Event) -> anyhow::Result<()> {
        let mut state = self.state.lock().map_err(|_| anyhow!("lock poisoned"))?;

        match event.event_type.as_str() {
            types::NAMESPACE_CREATED => {
                let e: NamespaceCreated = serde_json::from_value(event.payload.clone())?;
                let key = (e.tenant_resource_id, e.resource_id);
                let namespace = Namespace {
                    resource_id: e.resource_id,
                    tenant_resource_id: e.tenant_resource_id,
                    tenant_name: e.tenant_name.clone(),
                    name: e.name.clone(),
                    description: e.description,
                    created_at: e.created_at,
                    updated_at: None,
                    deleted_at: None,
                    metadata: e.metadata,
                };
                state.by_name.insert((e.tenant_name, e.name), key);
                state.by_id.insert(key, namespace);
            }
            types::NAMESPACE_UPDATED => {
                let e: NamespaceUpdated = serde_json::from_value(event.payload.clone())?;
                let key = (e.tenant_resource_id, e.resource_id);
                let Some(namespace) = state.by_id.get(&key).cloned() else {
                    return Ok(());
                };
                let mut updated = namespace;
                if let Some(name) = e.name {
                    state
                        .by_name
                        .remove(&(updated.tenant_name.clone(), updated.name.clone()));
                    state
                        .by_name
                        .insert((updated.tenant_name.clone(), name.clone()), key);
                    updated.name = name;
                }
                if let Some(description) = e.description {
                    updated.description = Some(description);
                }
                if let Some(metadata) = e.metadata {
                    updated.metadata = metadata;
                }
                updated.updated_at = Some(e.updated_at);
                state.by_id.insert(key, updated);
            }
            types::NAMESPACE_DELETED => {
                let e: NamespaceDeleted = serde_json::from_value(event.payload.clone())?;
                if let Some(namespace) = state
                    .by_id
                    .get_mut(&(e.tenant_resource_id, e.resource_id))
                {
                    namespace.deleted_at = Some(e.deleted_at);
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn get_by_id(
        &self,
        tenant_resource_id: &ResourceId,
        resource_id: &ResourceId,
    ) -> Option<Namespace> {
        self.state
            .lock()
            .ok()?
            .by_id
            .get(&(*tenant_resource_id, *resource_id))
            .cloned()
    }

    pub fn get_by_name(&self, tenant_name: &str, name: &str) -> Option<Namespace> {
        let state = self.state.lock().ok()?;
        let key = state
            .by_name
            .get(&(tenant_name.to_string(), name.to_string()))?;
        state.by_id.get(key).cloned()
    }

    pub fn get_for_tenant(&self, tenant_name: &str) -> Vec<Namespace> {
        self.state
            .lock()
            .map(|state| {
                state
                    .by_id
                    .values()
                    .filter(|ns| ns.tenant_name == tenant_name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_all(&self) -> Vec<Namespace> {
        self.state
            .lock()
            .map(|state| state.by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = NamespaceState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventline_events::EventId;
    use serde_json::json;

    fn event(event_type: &str, payload: serde_json::Value) -> Event {
        Event::new(EventId::new("namespaces", 1), Utc::now(), event_type, payload)
    }

    fn created(tenant_id: ResourceId, ns_id: ResourceId, tenant: &str, name: &str) -> Event {
        event(
            types::NAMESPACE_CREATED,
            serde_json::to_value(NamespaceCreated {
                resource_id: ns_id,
                tenant_resource_id: tenant_id,
                tenant_name: tenant.to_string(),
                name: name.to_string(),
                description: None,
                metadata: json!({}),
                created_at: Utc::now(),
            })
            .unwrap(),
        )
    }

    #[test]
    fn namespaces_are_scoped_to_their_tenant_name() {
        let projection = NamespaceProjection::new();
        let (t1, t2) = (ResourceId::new(), ResourceId::new());
        let (n1, n2) = (ResourceId::new(), ResourceId::new());

        projection.apply(&created(t1, n1, "acme", "billing")).unwrap();
        projection.apply(&created(t2, n2, "beta", "billing")).unwrap();

        assert_eq!(
            projection.get_by_name("acme", "billing").unwrap().resource_id,
            n1
        );
        assert_eq!(
            projection.get_by_name("beta", "billing").unwrap().resource_id,
            n2
        );
        assert_eq!(projection.get_for_tenant("acme").len(), 1);
    }

    #[test]
    fn rename_moves_the_name_index_entry() {
        let projection = NamespaceProjection::new();
        let tenant = ResourceId::new();
        let ns = ResourceId::new();
        projection.apply(&created(tenant, ns, "acme", "billing")).unwrap();

        projection
            .apply(&event(
                types::NAMESPACE_UPDATED,
                serde_json::to_value(NamespaceUpdated {
                    resource_id: ns,
                    tenant_resource_id: tenant,
                    name: Some("invoicing".to_string()),
                    description: None,
                    metadata: None,
                    updated_at: Utc::now(),
                })
                .unwrap(),
            ))
            .unwrap();

        assert!(projection.get_by_name("acme", "billing").is_none());
        assert!(projection.get_by_name("acme", "invoicing").is_some());
    }

    #[test]
    fn delete_is_soft() {
        let projection = NamespaceProjection::new();
        let tenant = ResourceId::new();
        let ns = ResourceId::new();
        projection.apply(&created(tenant, ns, "acme", "billing")).unwrap();
        projection
            .apply(&event(
                types::NAMESPACE_DELETED,
                serde_json::to_value(NamespaceDeleted {
                    resource_id: ns,
                    tenant_resource_id: tenant,
                    deleted_at: Utc::now(),
                })
                .unwrap(),
            ))
            .unwrap();

        assert!(!projection.get_by_id(&tenant, &ns).unwrap().is_active());
    }
}
