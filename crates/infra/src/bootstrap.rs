//! Idempotent system bootstrap.
//!
//! Ensures the system topics exist under the reserved scope and, on first
//! run, seeds the system tenant, the management namespace, and optionally an
//! admin user, all in one atomic batch.

use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use eventline_core::{Error, ResourceId, Result, system};
use eventline_events::EventId;
use eventline_events::system::{
    NamespaceCreated, TenantCreated, UserCreated, UserTenantAssigned, types,
};

use crate::event_store::{EventStore, EventWrite};
use crate::projections::ProjectionEngine;
use crate::topics::{CreateTopic, TopicRegistry};

/// Seed admin account, usually read from the environment.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

impl AdminSeed {
    /// Read `SYSTEM_ADMIN_EMAIL` / `SYSTEM_ADMIN_PASSWORD`; both must be set.
    pub fn from_env() -> Option<Self> {
        let email = std::env::var("SYSTEM_ADMIN_EMAIL").ok()?;
        let password = std::env::var("SYSTEM_ADMIN_PASSWORD").ok()?;
        if email.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self { email, password })
    }
}

pub struct Bootstrap {
    registry: Arc<TopicRegistry>,
    store: Arc<dyn EventStore>,
    projections: Option<Arc<ProjectionEngine>>,
}

impl Bootstrap {
    pub fn new(registry: Arc<TopicRegistry>, store: Arc<dyn EventStore>) -> Self {
        Self {
            registry,
            store,
            projections: None,
        }
    }

    pub fn with_projections(mut self, projections: Arc<ProjectionEngine>) -> Self {
        self.projections = Some(projections);
        self
    }

    /// Create any missing system topic under the reserved scope. Safe to call
    /// repeatedly.
    pub fn ensure_system_topics(&self) -> Result<()> {
        let scope = system::system_scope();
        for topic in system::SYSTEM_TOPICS {
            if self.registry.topic_exists(topic, &scope) {
                continue;
            }
            let created = self.registry.create_topic(
                CreateTopic {
                    resource_id: ResourceId::new(),
                    tenant_resource_id: ResourceId::new(),
                    namespace_resource_id: ResourceId::new(),
                    name: topic.to_string(),
                    schemas: vec![],
                },
                &scope,
            );
            match created {
                Ok(_) => debug!(topic, "created system topic"),
                // A concurrent bootstrap got there first.
                Err(Error::TopicAlreadyExists(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Full bootstrap. A nonempty `tenants` topic means the system is already
    /// bootstrapped and the call is a no-op.
    pub fn bootstrap(&self, admin: Option<AdminSeed>) -> Result<()> {
        self.ensure_system_topics()?;

        let scope = system::system_scope();
        if self
            .store
            .get_latest_event_id(system::TENANTS_TOPIC, &scope)?
            .is_some()
        {
            debug!("system already bootstrapped");
            return Ok(());
        }

        let now = Utc::now();
        let tenant_id = ResourceId::new();
        let namespace_id = ResourceId::new();
        let mut writes = Vec::new();

        let sequence = self
            .registry
            .get_and_increment_sequence(system::TENANTS_TOPIC, &scope)?;
        writes.push(EventWrite {
            topic: system::TENANTS_TOPIC.to_string(),
            event_type: types::TENANT_CREATED.to_string(),
            payload: serde_json::to_value(TenantCreated {
                resource_id: tenant_id,
                name: system::SYSTEM_TENANT_ID.to_string(),
                quota: None,
                metadata: json!({}),
                created_at: now,
            })
            .map_err(Error::storage)?,
            event_id: EventId::in_scope(&scope, system::TENANTS_TOPIC, sequence),
            timestamp: now,
        });

        let sequence = self
            .registry
            .get_and_increment_sequence(system::NAMESPACES_TOPIC, &scope)?;
        writes.push(EventWrite {
            topic: system::NAMESPACES_TOPIC.to_string(),
            event_type: types::NAMESPACE_CREATED.to_string(),
            payload: serde_json::to_value(NamespaceCreated {
                resource_id: namespace_id,
                tenant_resource_id: tenant_id,
                tenant_name: system::SYSTEM_TENANT_ID.to_string(),
                name: system::MANAGEMENT_NAMESPACE_ID.to_string(),
                description: Some("system management namespace".to_string()),
                metadata: json!({}),
                created_at: now,
            })
            .map_err(Error::storage)?,
            event_id: EventId::in_scope(&scope, system::NAMESPACES_TOPIC, sequence),
            timestamp: now,
        });

        if let Some(admin) = admin {
            let user_id = ResourceId::new();
            let password_hash = hash_password(&admin.password)?;

            let sequence = self
                .registry
                .get_and_increment_sequence(system::USERS_TOPIC, &scope)?;
            writes.push(EventWrite {
                topic: system::USERS_TOPIC.to_string(),
                event_type: types::USER_CREATED.to_string(),
                payload: serde_json::to_value(UserCreated {
                    resource_id: user_id,
                    email: admin.email,
                    display_name: Some("System Administrator".to_string()),
                    password_hash,
                    created_at: now,
                })
                .map_err(Error::storage)?,
                event_id: EventId::in_scope(&scope, system::USERS_TOPIC, sequence),
                timestamp: now,
            });

            let sequence = self
                .registry
                .get_and_increment_sequence(system::USERS_TOPIC, &scope)?;
            writes.push(EventWrite {
                topic: system::USERS_TOPIC.to_string(),
                event_type: types::USER_TENANT_ASSIGNED.to_string(),
                payload: serde_json::to_value(UserTenantAssigned {
                    user_resource_id: user_id,
                    tenant_resource_id: tenant_id,
                    role: "admin".to_string(),
                    assigned_at: now,
                })
                .map_err(Error::storage)?,
                event_id: EventId::in_scope(&scope, system::USERS_TOPIC, sequence),
                timestamp: now,
            });
        }

        let events = self.store.store_events(writes, &scope)?;
        if let Some(projections) = &self.projections {
            for event in &events {
                projections.apply(event.id.topic(), event);
            }
        }

        info!(events = events.len(), "system bootstrapped");
        Ok(())
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| Error::invalid_argument(format!("password hashing failed: {err}")))
}
