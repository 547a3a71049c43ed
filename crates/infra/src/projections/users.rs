//! User read model projected from the `users` system topic.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventline_core::ResourceId;
use eventline_events::Event;
use eventline_events::system::{
    UserCreated, UserPasswordChanged, UserStatus, UserStatusChanged, UserTenantAssigned,
    UserTenantRemoved, UserUpdated, types,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTenantAssociation {
    pub tenant_resource_id: ResourceId,
    pub role: String,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub resource_id: ResourceId,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub tenants: Vec<UserTenantAssociation>,
}

#[derive(Default)]
struct UserState {
    by_id: HashMap<ResourceId, User>,
    by_email: HashMap<String, ResourceId>,
}

#[derive(Default)]
pub struct UserProjection {
    state: Mutex<UserState>,
}

impl UserProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &Event) -> anyhow::Result<()> {
        let mut state = self.state.lock().map_err(|_| anyhow!("lock poisoned"))?;

        match event.event_type.as_str() {
            types::USER_CREATED => {
                let e: UserCreated = serde_json::from_value(event.payload.clone())?;
                let user = User {
                    resource_id: e.resource_id,
                    email: e.email.clone(),
                    display_name: e.display_name,
                    password_hash: e.password_hash,
                    status: UserStatus::Active,
                    created_at: e.created_at,
                    updated_at: None,
                    tenants: Vec::new(),
                };
                state.by_email.insert(e.email, e.resource_id);
                state.by_id.insert(e.resource_id, user);
            }
            types::USER_UPDATED => {
                let e: UserUpdated = serde_json::from_value(event.payload.clone())?;
                let Some(user) = state.by_id.get(&e.resource_id).cloned() else {
                    return Ok(());
                };
                let mut updated = user;
                if let Some(email) = e.email {
                    state.by_email.remove(&updated.email);
                    state.by_email.insert(email.clone(), e.resource_id);
                    updated.email = email;
                }
                if let Some(display_name) = e.display_name {
                    updated.display_name = Some(display_name);
                }
                updated.updated_at = Some(e.updated_at);
                state.by_id.insert(e.resource_id, updated);
            }
            types::USER_STATUS_CHANGED => {
                let e: UserStatusChanged = serde_json::from_value(event.payload.clone())?;
                if let Some(user) = state.by_id.get_mut(&e.resource_id) {
                    user.status = e.status;
                    user.updated_at = Some(e.changed_at);
                }
            }
            types::USER_PASSWORD_CHANGED => {
                let e: UserPasswordChanged = serde_json::from_value(event.payload.clone())?;
                if let Some(user) = state.by_id.get_mut(&e.resource_id) {
                    user.password_hash = e.password_hash;
                    user.updated_at = Some(e.changed_at);
                }
            }
            types::USER_TENANT_ASSIGNED => {
                let e: UserTenantAssigned = serde_json::from_value(event.payload.clone())?;
                if let Some(user) = state.by_id.get_mut(&e.user_resource_id) {
                    // Re-assignment replaces the role for that tenant.
                    user.tenants
                        .retain(|a| a.tenant_resource_id != e.tenant_resource_id);
                    user.tenants.push(UserTenantAssociation {
                        tenant_resource_id: e.tenant_resource_id,
                        role: e.role,
                        assigned_at: e.assigned_at,
                    });
                }
            }
            types::USER_TENANT_REMOVED => {
                let e: UserTenantRemoved = serde_json::from_value(event.payload.clone())?;
                if let Some(user) = state.by_id.get_mut(&e.user_resource_id) {
                    user.tenants
                        .retain(|a| a.tenant_resource_id != e.tenant_resource_id);
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn get_by_id(&self, resource_id: &ResourceId) -> Option<User> {
        self.state.lock().ok()?.by_id.get(resource_id).cloned()
    }

    pub fn get_by_email(&self, email: &str) -> Option<User> {
        let state = self.state.lock().ok()?;
        let id = state.by_email.get(email)?;
        state.by_id.get(id).cloned()
    }

    /// Every user except those with status DELETED.
    pub fn get_all_users(&self) -> Vec<User> {
        self.state
            .lock()
            .map(|state| {
                state
                    .by_id
                    .values()
                    .filter(|u| u.status != UserStatus::Deleted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = UserState::default();
        }
    }
}
