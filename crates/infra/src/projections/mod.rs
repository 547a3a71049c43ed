//! Event-sourced administrative read models.
//!
//! One projector per system topic. The system event log is the source of
//! truth; every projector is deterministic and can be rebuilt from scratch.
//! Projector state sits behind its own mutex, so applications are serialized
//! per projector and event order determines the result.

pub mod api_keys;
mod cache;
pub mod namespaces;
pub mod permissions;
pub mod tenants;
pub mod users;

pub use api_keys::{ApiKey, ApiKeyProjection};
pub use namespaces::{Namespace, NamespaceProjection};
pub use permissions::{GrantScope, PermissionGrant, PermissionProjection};
pub use tenants::{Tenant, TenantProjection};
pub use users::{User, UserProjection, UserTenantAssociation};

use tracing::warn;

use eventline_core::{Result, system};
use eventline_events::Event;

use crate::event_store::{EventQuery, EventStore};

/// Routes system-topic events to their projectors.
#[derive(Default)]
pub struct ProjectionEngine {
    pub tenants: TenantProjection,
    pub namespaces: NamespaceProjection,
    pub users: UserProjection,
    pub permissions: PermissionProjection,
    pub api_keys: ApiKeyProjection,
}

impl ProjectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event from a system topic. Events from unknown topics are
    /// ignored; projector failures (malformed payloads) are logged and
    /// skipped so one bad record cannot wedge the stream.
    pub fn apply(&self, topic: &str, event: &Event) {
        let applied = match topic {
            system::TENANTS_TOPIC => self.tenants.apply(event),
            system::NAMESPACES_TOPIC => self.namespaces.apply(event),
            system::USERS_TOPIC => self.users.apply(event),
            system::PERMISSIONS_TOPIC => self.permissions.apply(event),
            system::API_KEYS_TOPIC => self.api_keys.apply(event),
            _ => Ok(()),
        };
        if let Err(err) = applied {
            warn!(
                topic,
                event_id = %event.id,
                event_type = %event.event_type,
                error = %err,
                "projection skipped event"
            );
        }
    }

    /// Rebuild every read model by replaying the system topics in order.
    pub fn rebuild(&self, store: &dyn EventStore) -> Result<()> {
        self.tenants.reset();
        self.namespaces.reset();
        self.users.reset();
        self.permissions.reset();
        self.api_keys.reset();

        let scope = system::system_scope();
        for topic in system::SYSTEM_TOPICS {
            for event in store.get_events(topic, &EventQuery::all(), &scope)? {
                self.apply(topic, &event);
            }
        }
        Ok(())
    }
}
