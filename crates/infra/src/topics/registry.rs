//! Topic registry: lifecycle and atomic sequence allocation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use eventline_core::{Error, ResourceId, Result, TopicScope};
use eventline_events::{Schema, SchemaValidator, Topic};

use super::config::TopicConfigStore;

/// Parameters for `create_topic`.
#[derive(Debug, Clone)]
pub struct CreateTopic {
    pub resource_id: ResourceId,
    pub tenant_resource_id: ResourceId,
    pub namespace_resource_id: ResourceId,
    pub name: String,
    pub schemas: Vec<Schema>,
}

struct TopicEntry {
    topic: Topic,
    /// Scope the config file actually lives under; legacy flat-file topics
    /// keep `Default` so sequence updates rewrite the file they came from.
    scope: TopicScope,
}

/// Registry of topics keyed by qualified name, with one lock per topic.
///
/// The per-topic mutex serializes `create_topic`, sequence updates and schema
/// changes; readers clone the record under the lock and observe a consistent
/// `{sequence, schemas}` snapshot. Sequence allocation is the sole source of
/// sequence numbers for new events and persists through the config store
/// before releasing the lock.
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Arc<Mutex<TopicEntry>>>>,
    config: TopicConfigStore,
    validator: Arc<SchemaValidator>,
}

impl TopicRegistry {
    /// Load every persisted topic config and register its schemas.
    pub fn new(config: TopicConfigStore, validator: Arc<SchemaValidator>) -> Result<Self> {
        let mut topics = HashMap::new();
        for (scope, topic) in config.load_all()? {
            let key = scope.qualified_name(&topic.name);
            validator.register_schemas(&key, &topic.schemas)?;
            topics.insert(key, Arc::new(Mutex::new(TopicEntry { topic, scope })));
        }

        Ok(Self {
            topics: RwLock::new(topics),
            config,
            validator,
        })
    }

    fn entry(&self, name: &str, scope: &TopicScope) -> Result<Arc<Mutex<TopicEntry>>> {
        let topics = self
            .topics
            .read()
            .map_err(|_| Error::storage("topic registry lock poisoned"))?;
        let qualified = scope.qualified_name(name);
        topics
            .get(&qualified)
            // Scoped lookups fall back to topics registered before scoping.
            .or_else(|| (!scope.is_default()).then(|| topics.get(name)).flatten())
            .cloned()
            .ok_or_else(|| Error::topic_not_found(qualified))
    }

    pub fn create_topic(&self, params: CreateTopic, scope: &TopicScope) -> Result<Topic> {
        if params.name.trim().is_empty() {
            return Err(Error::invalid_argument("blank topic name"));
        }

        let mut topics = self
            .topics
            .write()
            .map_err(|_| Error::storage("topic registry lock poisoned"))?;

        let qualified = scope.qualified_name(&params.name);
        if topics.contains_key(&qualified)
            || (!scope.is_default() && topics.contains_key(&params.name))
        {
            return Err(Error::topic_already_exists(qualified));
        }

        self.validator.register_schemas(&qualified, &params.schemas)?;

        let (tenant, namespace) = scope.segments().unwrap_or(("", ""));
        let topic = Topic {
            resource_id: params.resource_id,
            tenant_resource_id: params.tenant_resource_id,
            namespace_resource_id: params.namespace_resource_id,
            name: params.name,
            sequence: 0,
            schemas: params.schemas,
            tenant_id: tenant.to_string(),
            namespace_id: namespace.to_string(),
        };
        self.config.save(&topic, scope)?;

        topics.insert(
            qualified,
            Arc::new(Mutex::new(TopicEntry {
                topic: topic.clone(),
                scope: scope.clone(),
            })),
        );

        Ok(topic)
    }

    pub fn get_topic(&self, name: &str, scope: &TopicScope) -> Option<Topic> {
        let entry = self.entry(name, scope).ok()?;
        let guard = entry.lock().ok()?;
        Some(guard.topic.clone())
    }

    pub fn topic_exists(&self, name: &str, scope: &TopicScope) -> bool {
        self.entry(name, scope).is_ok()
    }

    /// Every registered topic across all scopes.
    pub fn get_all_topics(&self) -> Vec<Topic> {
        let Ok(topics) = self.topics.read() else {
            return Vec::new();
        };
        topics
            .values()
            .filter_map(|entry| entry.lock().ok().map(|guard| guard.topic.clone()))
            .collect()
    }

    /// Qualified names of every registered topic.
    pub fn qualified_names(&self) -> Vec<String> {
        self.topics
            .read()
            .map(|topics| topics.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Unconditional sequence setter, for recovery tooling and tests.
    pub fn update_sequence(&self, name: &str, sequence: i64, scope: &TopicScope) -> Result<()> {
        let entry = self.entry(name, scope)?;
        let mut guard = entry
            .lock()
            .map_err(|_| Error::storage("topic lock poisoned"))?;

        let mut updated = guard.topic.clone();
        updated.sequence = sequence;
        self.config.save(&updated, &guard.scope)?;
        guard.topic = updated;
        Ok(())
    }

    /// Atomically allocate the next sequence number and return it.
    pub fn get_and_increment_sequence(&self, name: &str, scope: &TopicScope) -> Result<i64> {
        self.allocate_sequence_with(name, scope, Ok)
    }

    /// Allocate the next sequence and run `commit` with it before the topic
    /// lock is released. The publish path stores its event inside `commit`,
    /// which serializes same-topic storage writes: a smaller sequence can
    /// never become visible after a larger one.
    pub fn allocate_sequence_with<T>(
        &self,
        name: &str,
        scope: &TopicScope,
        commit: impl FnOnce(i64) -> Result<T>,
    ) -> Result<T> {
        let entry = self.entry(name, scope)?;
        let mut guard = entry
            .lock()
            .map_err(|_| Error::storage("topic lock poisoned"))?;

        let mut updated = guard.topic.clone();
        updated.sequence += 1;
        self.config.save(&updated, &guard.scope)?;
        let allocated = updated.sequence;
        guard.topic = updated;

        // The sequence stays consumed even if the commit fails: a storage
        // failure leaves a gap, never a duplicate.
        commit(allocated)
    }

    /// Replace a topic's schema set.
    ///
    /// Additive only: every previously registered event type must still be
    /// present. The sequence is untouched.
    pub fn update_schemas(
        &self,
        name: &str,
        schemas: Vec<Schema>,
        scope: &TopicScope,
    ) -> Result<Topic> {
        let entry = self.entry(name, scope)?;
        let mut guard = entry
            .lock()
            .map_err(|_| Error::storage("topic lock poisoned"))?;

        for existing in guard.topic.event_types() {
            if !schemas.iter().any(|s| s.event_type == existing) {
                return Err(Error::invalid_argument(format!(
                    "schema update for {name} removes event type {existing}"
                )));
            }
        }

        let qualified = guard.scope.qualified_name(name);
        self.validator.register_schemas(&qualified, &schemas)?;

        let mut updated = guard.topic.clone();
        updated.schemas = schemas;
        if let Err(err) = self.config.save(&updated, &guard.scope) {
            // Persisting failed: restore the validator to the stored set.
            let _ = self
                .validator
                .register_schemas(&qualified, &guard.topic.schemas);
            return Err(err);
        }
        guard.topic = updated.clone();
        Ok(updated)
    }
}
