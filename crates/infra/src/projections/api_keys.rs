//! API key read model projected from the `api-keys` system topic.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventline_core::ResourceId;
use eventline_events::Event;
use eventline_events::system::{ApiKeyCreated, ApiKeyRevoked, types};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub resource_id: ResourceId,
    pub user_resource_id: ResourceId,
    pub name: String,
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Active iff not revoked and not past expiry.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|expires| expires > now)
    }
}

#[derive(Default)]
pub struct ApiKeyProjection {
    keys: Mutex<HashMap<ResourceId, ApiKey>>,
}

impl ApiKeyProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &Event) -> anyhow::Result<()> {
        let mut keys = self.keys.lock().map_err(|_| anyhow!("lock poisoned"))?;

        match event.event_type.as_str() {
            types::API_KEY_CREATED => {
                let e: ApiKeyCreated = serde_json::from_value(event.payload.clone())?;
                keys.insert(
                    e.resource_id,
                    ApiKey {
                        resource_id: e.resource_id,
                        user_resource_id: e.user_resource_id,
                        name: e.name,
                        key_hash: e.key_hash,
                        created_at: e.created_at,
                        expires_at: e.expires_at,
                        revoked_at: None,
                    },
                );
            }
            types::API_KEY_REVOKED => {
                let e: ApiKeyRevoked = serde_json::from_value(event.payload.clone())?;
                if let Some(key) = keys.get_mut(&e.resource_id) {
                    key.revoked_at = Some(e.revoked_at);
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn get_by_id(&self, resource_id: &ResourceId) -> Option<ApiKey> {
        self.keys.lock().ok()?.get(resource_id).cloned()
    }

    pub fn get_for_user(&self, user_resource_id: &ResourceId) -> Vec<ApiKey> {
        self.keys
            .lock()
            .map(|keys| {
                keys.values()
                    .filter(|k| k.user_resource_id == *user_resource_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys that are currently usable.
    pub fn get_active(&self, now: DateTime<Utc>) -> Vec<ApiKey> {
        self.keys
            .lock()
            .map(|keys| keys.values().filter(|k| k.is_active(now)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.clear();
        }
    }
}
