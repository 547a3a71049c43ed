//! Tenant read model projected from the `tenants` system topic.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventline_core::ResourceId;
use eventline_events::Event;
use eventline_events::system::{TenantCreated, TenantDeleted, TenantUpdated, types};

/// Tenant read model. Deletion is soft: `is_active` is false once
/// `deleted_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub resource_id: ResourceId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub quota: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Default)]
struct TenantState {
    by_id: HashMap<ResourceId, Tenant>,
    by_name: HashMap<String, ResourceId>,
}

/// Folds `tenant.*` events; keeps the name and id indices consistent across
/// renames.
#[derive(Default)]
pub struct TenantProjection {
    state: Mutex<TenantState>,
}

impl TenantProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &Event) -> anyhow::Result<()> {
        let mut state = self.state.lock().map_err(|_| anyhow!("lock poisoned"))?;

        match event.event_type.as_str() {
            types::TENANT_CREATED => {
                let e: TenantCreated = serde_json::from_value(event.payload.clone())?;
                let tenant = Tenant {
                    resource_id: e.resource_id,
                    name: e.name.clone(),
                    created_at: e.created_at,
                    updated_at: None,
                    deleted_at: None,
                    quota: e.quota,
                    metadata: e.metadata,
                };
                state.by_name.insert(e.name, e.resource_id);
                state.by_id.insert(e.resource_id, tenant);
            }
            types::TENANT_UPDATED => {
                let e: TenantUpdated = serde_json::from_value(event.payload.clone())?;
                let Some(tenant) = state.by_id.get(&e.resource_id).cloned() else {
                    return Ok(());
                };
                let mut updated = tenant;
                if let Some(name) = e.name {
                    // Rename: the old name must stop resolving.
                    state.by_name.remove(&updated.name);
                    state.by_name.insert(name.clone(), e.resource_id);
                    updated.name = name;
                }
                if let Some(quota) = e.quota {
                    updated.quota = Some(quota);
                }
                if let Some(metadata) = e.metadata {
                    updated.metadata = metadata;
                }
                updated.updated_at = Some(e.updated_at);
                state.by_id.insert(e.resource_id, updated);
            }
            types::TENANT_DELETED => {
                let e: TenantDeleted = serde_json::from_value(event.payload.clone())?;
                if let Some(tenant) = state.by_id.get_mut(&e.resource_id) {
                    tenant.deleted_at = Some(e.deleted_at);
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn get_by_id(&self, resource_id: &ResourceId) -> Option<Tenant> {
        self.state.lock().ok()?.by_id.get(resource_id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Tenant> {
        let state = self.state.lock().ok()?;
        let id = state.by_name.get(name)?;
        state.by_id.get(id).cloned()
    }

    pub fn get_all(&self) -> Vec<Tenant> {
        self.state
            .lock()
            .map(|state| state.by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop all state before a replay.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = TenantState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventline_events::EventId;
    use serde_json::json;

    fn event(seq: i64, event_type: &str, payload: serde_json::Value) -> Event {
        Event::new(EventId::new("tenants", seq), Utc::now(), event_type, payload)
    }

    fn created(resource_id: ResourceId, name: &str) -> Event {
        event(
            1,
            types::TENANT_CREATED,
            serde_json::to_value(TenantCreated {
                resource_id,
                name: name.to_string(),
                quota: None,
                metadata: json!({}),
                created_at: Utc::now(),
            })
            .unwrap(),
        )
    }

    #[test]
    fn created_tenant_resolves_by_name_and_id() {
        let projection = TenantProjection::new();
        let id = ResourceId::new();
        projection.apply(&created(id, "acme")).unwrap();

        assert_eq!(projection.get_by_name("acme").unwrap().resource_id, id);
        assert!(projection.get_by_id(&id).unwrap().is_active());
    }

    #[test]
    fn rename_invalidates_the_old_name() {
        let projection = TenantProjection::new();
        let id = ResourceId::new();
        projection.apply(&created(id, "acme")).unwrap();

        projection
            .apply(&event(
                2,
                types::TENANT_UPDATED,
                serde_json::to_value(TenantUpdated {
                    resource_id: id,
                    name: Some("acme2".to_string()),
                    quota: None,
                    metadata: None,
                    updated_at: Utc::now(),
                })
                .unwrap(),
            ))
            .unwrap();

        assert!(projection.get_by_name("acme").is_none());
        let renamed = projection.get_by_name("acme2").unwrap();
        assert_eq!(renamed.resource_id, id);
        assert!(renamed.is_active());
    }

    #[test]
    fn delete_is_soft() {
        let projection = TenantProjection::new();
        let id = ResourceId::new();
        projection.apply(&created(id, "acme")).unwrap();
        projection
            .apply(&event(
                2,
                types::TENANT_DELETED,
                serde_json::to_value(TenantDeleted {
                    resource_id: id,
                    deleted_at: Utc::now(),
                })
                .unwrap(),
            ))
            .unwrap();

        let tenant = projection.get_by_id(&id).unwrap();
        assert!(!tenant.is_active());
        assert!(tenant.deleted_at.is_some());
    }

    #[test]
    fn malformed_payload_is_an_error_not_a_panic() {
        let projection = TenantProjection::new();
        let bad = event(1, types::TENANT_CREATED, json!("not an object"));
        assert!(projection.apply(&bad).is_err());
    }
}
