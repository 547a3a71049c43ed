//! Route handlers.

pub mod consumers;
pub mod events;
pub mod health;
pub mod topics;

use serde::Deserialize;

use eventline_core::{Error, Result, TopicScope};

/// Optional `?tenant=&namespace=` pair shared by several endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct ScopeQuery {
    pub tenant: Option<String>,
    pub namespace: Option<String>,
}

impl ScopeQuery {
    pub fn resolve(self) -> Result<TopicScope> {
        resolve_scope(self.tenant, self.namespace)
    }
}

pub(crate) fn resolve_scope(
    tenant: Option<String>,
    namespace: Option<String>,
) -> Result<TopicScope> {
    match (tenant, namespace) {
        (None, None) => Ok(TopicScope::Default),
        (Some(tenant), Some(namespace)) if !tenant.is_empty() && !namespace.is_empty() => {
            Ok(TopicScope::scoped(tenant, namespace))
        }
        _ => Err(Error::invalid_argument(
            "tenant and namespace must be provided together",
        )),
    }
}
