//! Webhook consumer registry and the registration use case.

pub mod filesystem;
pub mod memory;

pub use filesystem::FileSystemConsumerRegistry;
pub use memory::InMemoryConsumerRegistry;

use std::collections::BTreeMap;
use std::sync::Arc;

use eventline_core::{ConsumerId, Error, Result, TopicScope};
use eventline_events::{Consumer, EventId};

use crate::topics::TopicRegistry;

/// Durable registry of webhook subscribers and their per-topic cursors.
///
/// Consumers match a topic by carrying its qualified name in their `topics`
/// map. Mutations run under the implementation's registry lock; reads see a
/// consistent snapshot.
pub trait ConsumerRegistry: Send + Sync {
    /// Insert or replace by id.
    fn save(&self, consumer: Consumer) -> Result<()>;

    fn find_by_id(&self, id: &ConsumerId) -> Result<Option<Consumer>>;

    fn find_all(&self) -> Result<Vec<Consumer>>;

    fn find_by_topic(&self, qualified_topic: &str) -> Result<Vec<Consumer>>;

    fn find_by_tenant_and_namespace(&self, tenant: &str, namespace: &str)
    -> Result<Vec<Consumer>>;

    /// `true` if a consumer was removed.
    fn delete(&self, id: &ConsumerId) -> Result<bool>;

    fn count(&self) -> Result<usize>;
}

impl<R> ConsumerRegistry for Arc<R>
where
    R: ConsumerRegistry + ?Sized,
{
    fn save(&self, consumer: Consumer) -> Result<()> {
        (**self).save(consumer)
    }

    fn find_by_id(&self, id: &ConsumerId) -> Result<Option<Consumer>> {
        (**self).find_by_id(id)
    }

    fn find_all(&self) -> Result<Vec<Consumer>> {
        (**self).find_all()
    }

    fn find_by_topic(&self, qualified_topic: &str) -> Result<Vec<Consumer>> {
        (**self).find_by_topic(qualified_topic)
    }

    fn find_by_tenant_and_namespace(
        &self,
        tenant: &str,
        namespace: &str,
    ) -> Result<Vec<Consumer>> {
        (**self).find_by_tenant_and_namespace(tenant, namespace)
    }

    fn delete(&self, id: &ConsumerId) -> Result<bool> {
        (**self).delete(id)
    }

    fn count(&self) -> Result<usize> {
        (**self).count()
    }
}

/// Whether a qualified topic name belongs to the given (tenant, namespace).
pub(crate) fn topic_in_tenant_namespace(qualified: &str, tenant: &str, namespace: &str) -> bool {
    match TopicScope::parse_qualified(qualified) {
        Ok((TopicScope::Scoped { tenant: t, namespace: n }, _)) => t == tenant && n == namespace,
        _ => false,
    }
}

/// Register a new consumer.
///
/// Validates the callback URL (absolute http/https), requires at least one
/// subscription, and checks every referenced topic exists. The consumer gets
/// a fresh UUIDv4 id and is persisted before it is returned.
pub fn register_consumer(
    registry: &dyn ConsumerRegistry,
    topics: &TopicRegistry,
    callback_url: &str,
    subscriptions: BTreeMap<String, Option<EventId>>,
) -> Result<Consumer> {
    let url = reqwest::Url::parse(callback_url)
        .map_err(|e| Error::invalid_argument(format!("callback URL {callback_url:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::invalid_argument(format!(
            "callback URL must be absolute http(s): {callback_url:?}"
        )));
    }

    if subscriptions.is_empty() {
        return Err(Error::invalid_argument(
            "consumer must subscribe to at least one topic",
        ));
    }

    for qualified in subscriptions.keys() {
        let (scope, name) = TopicScope::parse_qualified(qualified)?;
        if !topics.topic_exists(&name, &scope) {
            return Err(Error::topic_not_found(qualified.clone()));
        }
    }

    let consumer = Consumer::new(url.to_string(), subscriptions);
    registry.save(consumer.clone())?;
    Ok(consumer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::{CreateTopic, TopicConfigStore};
    use eventline_core::ResourceId;
    use eventline_events::SchemaValidator;
    use tempfile::TempDir;

    fn topic_registry(dir: &TempDir) -> TopicRegistry {
        let registry = TopicRegistry::new(
            TopicConfigStore::new(dir.path()),
            Arc::new(SchemaValidator::new()),
        )
        .unwrap();
        registry
            .create_topic(
                CreateTopic {
                    resource_id: ResourceId::new(),
                    tenant_resource_id: ResourceId::new(),
                    namespace_resource_id: ResourceId::new(),
                    name: "user-events".to_string(),
                    schemas: vec![],
                },
                &TopicScope::Default,
            )
            .unwrap();
        registry
    }

    fn subscriptions(topic: &str) -> BTreeMap<String, Option<EventId>> {
        let mut map = BTreeMap::new();
        map.insert(topic.to_string(), None);
        map
    }

    #[test]
    fn registration_assigns_a_fresh_v4_id_and_persists() {
        let dir = TempDir::new().unwrap();
        let topics = topic_registry(&dir);
        let registry = InMemoryConsumerRegistry::new();

        let consumer = register_consumer(
            &registry,
            &topics,
            "http://127.0.0.1:19000/webhook",
            subscriptions("user-events"),
        )
        .unwrap();

        assert_eq!(consumer.id.as_uuid().get_version_num(), 4);
        assert_eq!(registry.count().unwrap(), 1);
        assert_eq!(
            registry.find_by_id(&consumer.id).unwrap().unwrap(),
            consumer
        );
    }

    #[test]
    fn relative_or_non_http_callbacks_are_rejected() {
        let dir = TempDir::new().unwrap();
        let topics = topic_registry(&dir);
        let registry = InMemoryConsumerRegistry::new();

        for bad in ["/webhook", "not a url", "ftp://example.com/hook"] {
            assert!(matches!(
                register_consumer(&registry, &topics, bad, subscriptions("user-events")),
                Err(Error::InvalidArgument(_))
            ));
        }
        assert_eq!(registry.count().unwrap(), 0);
    }

    #[test]
    fn empty_subscriptions_are_rejected() {
        let dir = TempDir::new().unwrap();
        let topics = topic_registry(&dir);
        let registry = InMemoryConsumerRegistry::new();

        assert!(matches!(
            register_consumer(&registry, &topics, "http://example.com/h", BTreeMap::new()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn unknown_topics_are_rejected() {
        let dir = TempDir::new().unwrap();
        let topics = topic_registry(&dir);
        let registry = InMemoryConsumerRegistry::new();

        assert!(matches!(
            register_consumer(
                &registry,
                &topics,
                "http://example.com/h",
                subscriptions("missing-topic"),
            ),
            Err(Error::TopicNotFound(_))
        ));
    }
}
