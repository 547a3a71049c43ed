//! Permission grants projected from the `permissions` system topic, plus the
//! effective-permission check.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventline_events::Event;
use eventline_events::system::{
    GrantResourceType, Permission, PermissionGranted, PermissionRevoked, PrincipalType, types,
};

use super::cache::{PermissionCache, ScopeKey};

/// An active grant held by a principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub principal_id: String,
    pub principal_type: PrincipalType,
    pub resource_type: GrantResourceType,
    /// `None` grants every resource of the type within scope.
    pub resource_id: Option<String>,
    pub tenant_resource_id: Option<String>,
    pub namespace_resource_id: Option<String>,
    pub topic_resource_id: Option<String>,
    pub permissions: BTreeSet<Permission>,
    pub constraints: serde_json::Value,
    pub granted_by: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PermissionGrant {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Same resource coordinates: revocations subtract from grants that
    /// match on all of them.
    fn same_target(&self, revoked: &PermissionRevoked) -> bool {
        self.resource_type == revoked.resource_type
            && self.resource_id == revoked.resource_id
            && self.tenant_resource_id == revoked.tenant_resource_id
            && self.namespace_resource_id == revoked.namespace_resource_id
            && self.topic_resource_id == revoked.topic_resource_id
    }

    /// Whether this grant covers the requested scope. A `None` scope field in
    /// the grant is a wildcard within its enclosing scope.
    fn covers_scope(&self, scope: &GrantScope) -> bool {
        fn field_covers(grant: &Option<String>, requested: &Option<String>) -> bool {
            match grant {
                None => true,
                Some(value) => requested.as_deref() == Some(value.as_str()),
            }
        }
        field_covers(&self.tenant_resource_id, &scope.tenant)
            && field_covers(&self.namespace_resource_id, &scope.namespace)
            && field_covers(&self.topic_resource_id, &scope.topic)
    }

    fn covers_resource(&self, resource_id: Option<&str>) -> bool {
        match &self.resource_id {
            None => true,
            Some(granted) => resource_id == Some(granted.as_str()),
        }
    }

    fn allows(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission) || self.permissions.contains(&Permission::Admin)
    }
}

/// The scope a permission check runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantScope {
    pub tenant: Option<String>,
    pub namespace: Option<String>,
    pub topic: Option<String>,
}

impl GrantScope {
    pub fn tenant(tenant: impl Into<String>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            ..Self::default()
        }
    }
}

/// Folds `permission.{granted,revoked}` and answers effective-permission
/// checks through a bounded per-principal cache.
pub struct PermissionProjection {
    grants: Mutex<HashMap<String, Vec<PermissionGrant>>>,
    cache: PermissionCache,
}

impl Default for PermissionProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionProjection {
    pub fn new() -> Self {
        Self {
            grants: Mutex::new(HashMap::new()),
            cache: PermissionCache::new(1024),
        }
    }

    pub fn apply(&self, event: &Event) -> anyhow::Result<()> {
        let mut grants = self.grants.lock().map_err(|_| anyhow!("lock poisoned"))?;

        match event.event_type.as_str() {
            types::PERMISSION_GRANTED => {
                let e: PermissionGranted = serde_json::from_value(event.payload.clone())?;
                let grant = PermissionGrant {
                    principal_id: e.principal_id.clone(),
                    principal_type: e.principal_type,
                    resource_type: e.resource_type,
                    resource_id: e.resource_id,
                    tenant_resource_id: e.tenant_resource_id,
                    namespace_resource_id: e.namespace_resource_id,
                    topic_resource_id: e.topic_resource_id,
                    permissions: e.permissions.into_iter().collect(),
                    constraints: e.constraints,
                    granted_by: e.granted_by,
                    granted_at: e.granted_at,
                    expires_at: e.expires_at,
                };
                grants.entry(e.principal_id.clone()).or_default().push(grant);
                self.cache.invalidate_principal(&e.principal_id);
            }
            types::PERMISSION_REVOKED => {
                let e: PermissionRevoked = serde_json::from_value(event.payload.clone())?;
                if let Some(held) = grants.get_mut(&e.principal_id) {
                    let revoked: BTreeSet<Permission> = e.permissions.iter().copied().collect();
                    for grant in held.iter_mut().filter(|g| g.same_target(&e)) {
                        grant.permissions = &grant.permissions - &revoked;
                    }
                    // Grants left with nothing are removed outright.
                    held.retain(|g| !g.permissions.is_empty());
                    if held.is_empty() {
                        grants.remove(&e.principal_id);
                    }
                }
                self.cache.invalidate_principal(&e.principal_id);
            }
            _ => {}
        }

        Ok(())
    }

    pub fn grants_for(&self, principal_id: &str) -> Vec<PermissionGrant> {
        self.grants
            .lock()
            .map(|grants| grants.get(principal_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Effective-permission check.
    ///
    /// True iff a nonexpired grant matches the resource type, covers the
    /// requested scope (null grant fields are wildcards), covers the resource
    /// (a null grant `resource_id` matches any instance), and carries the
    /// permission or ADMIN.
    pub fn has_permission(
        &self,
        principal_id: &str,
        permission: Permission,
        resource_type: GrantResourceType,
        resource_id: Option<&str>,
        scope: &GrantScope,
        now: DateTime<Utc>,
    ) -> bool {
        let key = ScopeKey::new(principal_id, scope);
        let scoped = match self.cache.get(&key) {
            Some(cached) => cached,
            None => {
                let scoped: Vec<PermissionGrant> = self
                    .grants_for(principal_id)
                    .into_iter()
                    .filter(|g| g.covers_scope(scope))
                    .collect();
                self.cache.insert(key, scoped.clone());
                scoped
            }
        };

        scoped.iter().any(|grant| {
            !grant.expired(now)
                && grant.resource_type == resource_type
                && grant.covers_resource(resource_id)
                && grant.allows(permission)
        })
    }

    pub fn reset(&self) {
        if let Ok(mut grants) = self.grants.lock() {
            grants.clear();
        }
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use eventline_events::EventId;

    fn granted_event(e: PermissionGranted) -> Event {
        Event::new(
            EventId::new("permissions", 1),
            Utc::now(),
            types::PERMISSION_GRANTED,
            serde_json::to_value(e).unwrap(),
        )
    }

    fn revoked_event(e: PermissionRevoked) -> Event {
        Event::new(
            EventId::new("permissions", 2),
            Utc::now(),
            types::PERMISSION_REVOKED,
            serde_json::to_value(e).unwrap(),
        )
    }

    fn grant(
        principal: &str,
        resource_type: GrantResourceType,
        resource_id: Option<&str>,
        tenant: Option<&str>,
        permissions: Vec<Permission>,
    ) -> PermissionGranted {
        PermissionGranted {
            principal_id: principal.to_string(),
            principal_type: PrincipalType::User,
            resource_type,
            resource_id: resource_id.map(str::to_string),
            tenant_resource_id: tenant.map(str::to_string),
            namespace_resource_id: None,
            topic_resource_id: None,
            permissions,
            constraints: serde_json::json!({}),
            granted_by: "root".to_string(),
            granted_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn null_resource_id_matches_any_instance() {
        let projection = PermissionProjection::new();
        projection
            .apply(&granted_event(grant(
                "u1",
                GrantResourceType::Topic,
                None,
                Some("t1"),
                vec![Permission::Read],
            )))
            .unwrap();

        let scope = GrantScope::tenant("t1");
        for topic in ["orders", "invoices"] {
            assert!(projection.has_permission(
                "u1",
                Permission::Read,
                GrantResourceType::Topic,
                Some(topic),
                &scope,
                Utc::now(),
            ));
        }
        assert!(!projection.has_permission(
            "u1",
            Permission::Write,
            GrantResourceType::Topic,
            Some("orders"),
            &scope,
            Utc::now(),
        ));
    }

    #[test]
    fn admin_grants_every_permission_within_scope() {
        let projection = PermissionProjection::new();
        projection
            .apply(&granted_event(grant(
                "u1",
                GrantResourceType::Topic,
                None,
                Some("t1"),
                vec![Permission::Admin],
            )))
            .unwrap();

        let scope = GrantScope::tenant("t1");
        for permission in [
            Permission::Read,
            Permission::Write,
            Permission::Delete,
            Permission::Manage,
        ] {
            assert!(projection.has_permission(
                "u1",
                permission,
                GrantResourceType::Topic,
                Some("orders"),
                &scope,
                Utc::now(),
            ));
        }
        // A scoped ADMIN does not leak into other tenants.
        assert!(!projection.has_permission(
            "u1",
            Permission::Read,
            GrantResourceType::Topic,
            Some("orders"),
            &GrantScope::tenant("t2"),
            Utc::now(),
        ));
    }

    #[test]
    fn null_scope_fields_act_as_wildcards() {
        let projection = PermissionProjection::new();
        projection
            .apply(&granted_event(grant(
                "u1",
                GrantResourceType::Topic,
                None,
                None,
                vec![Permission::Read],
            )))
            .unwrap();

        for tenant in ["t1", "t2"] {
            assert!(projection.has_permission(
                "u1",
                Permission::Read,
                GrantResourceType::Topic,
                Some("orders"),
                &GrantScope::tenant(tenant),
                Utc::now(),
            ));
        }
    }

    #[test]
    fn expired_grants_do_not_match() {
        let projection = PermissionProjection::new();
        let mut g = grant(
            "u1",
            GrantResourceType::Topic,
            None,
            None,
            vec![Permission::Read],
        );
        g.expires_at = Some(Utc::now() - Duration::hours(1));
        projection.apply(&granted_event(g)).unwrap();

        assert!(!projection.has_permission(
            "u1",
            Permission::Read,
            GrantResourceType::Topic,
            Some("orders"),
            &GrantScope::default(),
            Utc::now(),
        ));
    }

    #[test]
    fn revocation_subtracts_and_removes_empty_grants() {
        let projection = PermissionProjection::new();
        projection
            .apply(&granted_event(grant(
                "u1",
                GrantResourceType::Topic,
                Some("orders"),
                Some("t1"),
                vec![Permission::Read, Permission::Write],
            )))
            .unwrap();

        projection
            .apply(&revoked_event(PermissionRevoked {
                principal_id: "u1".to_string(),
                resource_type: GrantResourceType::Topic,
                resource_id: Some("orders".to_string()),
                tenant_resource_id: Some("t1".to_string()),
                namespace_resource_id: None,
                topic_resource_id: None,
                permissions: vec![Permission::Write],
                revoked_at: Utc::now(),
            }))
            .unwrap();

        let scope = GrantScope::tenant("t1");
        assert!(projection.has_permission(
            "u1",
            Permission::Read,
            GrantResourceType::Topic,
            Some("orders"),
            &scope,
            Utc::now(),
        ));
        assert!(!projection.has_permission(
            "u1",
            Permission::Write,
            GrantResourceType::Topic,
            Some("orders"),
            &scope,
            Utc::now(),
        ));

        // Revoking the rest removes the grant record entirely.
        projection
            .apply(&revoked_event(PermissionRevoked {
                principal_id: "u1".to_string(),
                resource_type: GrantResourceType::Topic,
                resource_id: Some("orders".to_string()),
                tenant_resource_id: Some("t1".to_string()),
                namespace_resource_id: None,
                topic_resource_id: None,
                permissions: vec![Permission::Read],
                revoked_at: Utc::now(),
            }))
            .unwrap();
        assert!(projection.grants_for("u1").is_empty());
    }

    #[test]
    fn cached_checks_see_revocations() {
        let projection = PermissionProjection::new();
        projection
            .apply(&granted_event(grant(
                "u1",
                GrantResourceType::Topic,
                None,
                Some("t1"),
                vec![Permission::Read],
            )))
            .unwrap();

        let scope = GrantScope::tenant("t1");
        // Prime the cache.
        assert!(projection.has_permission(
            "u1",
            Permission::Read,
            GrantResourceType::Topic,
            Some("orders"),
            &scope,
            Utc::now(),
        ));

        projection
            .apply(&revoked_event(PermissionRevoked {
                principal_id: "u1".to_string(),
                resource_type: GrantResourceType::Topic,
                resource_id: None,
                tenant_resource_id: Some("t1".to_string()),
                namespace_resource_id: None,
                topic_resource_id: None,
                permissions: vec![Permission::Read],
                revoked_at: Utc::now(),
            }))
            .unwrap();

        assert!(!projection.has_permission(
            "u1",
            Permission::Read,
            GrantResourceType::Topic,
            Some("orders"),
            &scope,
            Utc::now(),
        ));
    }
}
