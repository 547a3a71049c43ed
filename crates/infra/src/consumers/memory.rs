//! In-memory consumer registry for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;

use eventline_core::{ConsumerId, Error, Result};
use eventline_events::Consumer;

use super::{ConsumerRegistry, topic_in_tenant_namespace};

#[derive(Default)]
pub struct InMemoryConsumerRegistry {
    consumers: Mutex<HashMap<ConsumerId, Consumer>>,
}

impl InMemoryConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConsumerRegistry for InMemoryConsumerRegistry {
    fn save(&self, consumer: Consumer) -> Result<()> {
        self.consumers
            .lock()
            .map_err(|_| Error::storage("consumer registry lock poisoned"))?
            .insert(consumer.id, consumer);
        Ok(())
    }

    fn find_by_id(&self, id: &ConsumerId) -> Result<Option<Consumer>> {
        Ok(self
            .consumers
            .lock()
            .map_err(|_| Error::storage("consumer registry lock poisoned"))?
            .get(id)
            .cloned())
    }

    fn find_all(&self) -> Result<Vec<Consumer>> {
        Ok(self
            .consumers
            .lock()
            .map_err(|_| Error::storage("consumer registry lock poisoned"))?
            .values()
            .cloned()
            .collect())
    }

    fn find_by_topic(&self, qualified_topic: &str) -> Result<Vec<Consumer>> {
        Ok(self
            .consumers
            .lock()
            .map_err(|_| Error::storage("consumer registry lock poisoned"))?
            .values()
            .filter(|c| c.subscribes_to(qualified_topic))
            .cloned()
            .collect())
    }

    fn find_by_tenant_and_namespace(
        &self,
        tenant: &str,
        namespace: &str,
    ) -> Result<Vec<Consumer>> {
        Ok(self
            .consumers
            .lock()
            .map_err(|_| Error::storage("consumer registry lock poisoned"))?
            .values()
            .filter(|c| {
                c.topics
                    .keys()
                    .any(|q| topic_in_tenant_namespace(q, tenant, namespace))
            })
            .cloned()
            .collect())
    }

    fn delete(&self, id: &ConsumerId) -> Result<bool> {
        Ok(self
            .consumers
            .lock()
            .map_err(|_| Error::storage("consumer registry lock poisoned"))?
            .remove(id)
            .is_some())
    }

    fn count(&self) -> Result<usize> {
        Ok(self
            .consumers
            .lock()
            .map_err(|_| Error::storage("consumer registry lock poisoned"))?
            .len())
    }
}
