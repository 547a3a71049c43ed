//! Topic scoping: every topic lives under a (tenant, namespace) pair, except
//! legacy topics which live in the default (unscoped) namespace.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The (tenant, namespace) pair a topic belongs to.
///
/// `Default` is the legacy unscoped namespace: qualified names and storage
/// paths omit the tenant/namespace segments entirely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopicScope {
    Default,
    Scoped { tenant: String, namespace: String },
}

impl TopicScope {
    pub fn scoped(tenant: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::Scoped {
            tenant: tenant.into(),
            namespace: namespace.into(),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Tenant and namespace names, when scoped.
    pub fn segments(&self) -> Option<(&str, &str)> {
        match self {
            Self::Default => None,
            Self::Scoped { tenant, namespace } => Some((tenant, namespace)),
        }
    }

    /// Qualified topic name: `tenant/namespace/topic`, or the bare topic name
    /// in the default scope.
    ///
    /// Qualified names key consumer subscription maps and dispatcher routing.
    pub fn qualified_name(&self, topic: &str) -> String {
        match self {
            Self::Default => topic.to_string(),
            Self::Scoped { tenant, namespace } => format!("{tenant}/{namespace}/{topic}"),
        }
    }

    /// Split a qualified topic name back into scope and topic name.
    pub fn parse_qualified(qualified: &str) -> Result<(TopicScope, String)> {
        let segments: Vec<&str> = qualified.split('/').collect();
        match segments.as_slice() {
            [topic] if !topic.is_empty() => Ok((TopicScope::Default, topic.to_string())),
            [tenant, namespace, topic]
                if !tenant.is_empty() && !namespace.is_empty() && !topic.is_empty() =>
            {
                Ok((TopicScope::scoped(*tenant, *namespace), topic.to_string()))
            }
            _ => Err(Error::invalid_argument(format!(
                "malformed qualified topic name: {qualified:?}"
            ))),
        }
    }
}

impl Default for TopicScope {
    fn default() -> Self {
        Self::Default
    }
}
