//! Reserved system identifiers.
//!
//! Fixed at process start; administrative events are recorded on the system
//! topics under the (system tenant, management namespace) scope.

use crate::scope::TopicScope;

/// Name of the reserved system tenant.
pub const SYSTEM_TENANT_ID: &str = "system";

/// Name of the reserved management namespace inside the system tenant.
pub const MANAGEMENT_NAMESPACE_ID: &str = "management";

pub const TENANTS_TOPIC: &str = "tenants";
pub const NAMESPACES_TOPIC: &str = "namespaces";
pub const USERS_TOPIC: &str = "users";
pub const PERMISSIONS_TOPIC: &str = "permissions";
pub const API_KEYS_TOPIC: &str = "api-keys";

/// All system topics, in bootstrap order.
pub const SYSTEM_TOPICS: [&str; 5] = [
    TENANTS_TOPIC,
    NAMESPACES_TOPIC,
    USERS_TOPIC,
    PERMISSIONS_TOPIC,
    API_KEYS_TOPIC,
];

/// The scope under which all system topics live.
pub fn system_scope() -> TopicScope {
    TopicScope::scoped(SYSTEM_TENANT_ID, MANAGEMENT_NAMESPACE_ID)
}

/// Whether `(scope, topic)` addresses one of the reserved system topics.
pub fn is_system_topic(scope: &TopicScope, topic: &str) -> bool {
    scope == &system_scope() && SYSTEM_TOPICS.contains(&topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_topics_are_recognized() {
        assert!(is_system_topic(&system_scope(), "tenants"));
        assert!(is_system_topic(&system_scope(), "api-keys"));
        assert!(!is_system_topic(&system_scope(), "orders"));
        assert!(!is_system_topic(&TopicScope::Default, "tenants"));
    }
}
