//! Bounded cache of scope-filtered permission grants.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::permissions::{GrantScope, PermissionGrant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ScopeKey {
    pub principal: String,
    pub tenant: Option<String>,
    pub namespace: Option<String>,
    pub topic: Option<String>,
}

impl ScopeKey {
    pub fn new(principal: &str, scope: &GrantScope) -> Self {
        Self {
            principal: principal.to_string(),
            tenant: scope.tenant.clone(),
            namespace: scope.namespace.clone(),
            topic: scope.topic.clone(),
        }
    }
}

struct CacheEntry {
    grants: Vec<PermissionGrant>,
    last_used: u64,
}

/// LRU-ish cache keyed by (principal, tenant scope, namespace scope, topic
/// scope). Any change touching a principal invalidates all of its entries.
pub(crate) struct PermissionCache {
    entries: Mutex<HashMap<ScopeKey, CacheEntry>>,
    capacity: usize,
    clock: AtomicU64,
}

impl PermissionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &ScopeKey) -> Option<Vec<PermissionGrant>> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get_mut(key)?;
        entry.last_used = self.clock.fetch_add(1, Ordering::Relaxed);
        Some(entry.grants.clone())
    }

    pub fn insert(&self, key: ScopeKey, grants: Vec<PermissionGrant>) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            // Evict the least recently used entry.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                grants,
                last_used: self.clock.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    pub fn invalidate_principal(&self, principal: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|key, _| key.principal != principal);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}
