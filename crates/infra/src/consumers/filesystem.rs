//! File-backed consumer registry.
//!
//! One JSON file per consumer at `<root>/<consumer-id>.json`, mirrored in
//! memory. The full set is loaded once at startup; every mutation rewrites
//! the affected file under the registry lock.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use eventline_core::{ConsumerId, Error, Result};
use eventline_events::Consumer;

use super::{ConsumerRegistry, topic_in_tenant_namespace};

pub struct FileSystemConsumerRegistry {
    root: PathBuf,
    consumers: Mutex<HashMap<ConsumerId, Consumer>>,
}

impl FileSystemConsumerRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(Error::storage)?;

        let mut consumers = HashMap::new();
        for entry in fs::read_dir(&root).map_err(Error::storage)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable consumer file");
                    continue;
                }
            };
            match serde_json::from_slice::<Consumer>(&bytes) {
                Ok(consumer) => {
                    consumers.insert(consumer.id, consumer);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping malformed consumer file")
                }
            }
        }

        Ok(Self {
            root,
            consumers: Mutex::new(consumers),
        })
    }

    fn path_for(&self, id: &ConsumerId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn persist(&self, consumer: &Consumer) -> Result<()> {
        let path = self.path_for(&consumer.id);
        let body = serde_json::to_vec_pretty(consumer).map_err(Error::storage)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(Error::storage)?;
        fs::rename(&tmp, &path).map_err(Error::storage)?;
        Ok(())
    }
}

impl ConsumerRegistry for FileSystemConsumerRegistry {
    fn save(&self, consumer: Consumer) -> Result<()> {
        let mut consumers = self
            .consumers
            .lock()
            .map_err(|_| Error::storage("consumer registry lock poisoned"))?;
        self.persist(&consumer)?;
        consumers.insert(consumer.id, consumer);
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
        let mut consumers = self
            .consumers
            .lock()
            .map_err(|_| Error::storage("consumer registry lock poisoned"))?;
        if consumers.remove(id).is_none() {
            return Ok(false);
        }
        if let Err(err) = fs::remove_file(self.path_for(id)) {
            warn!(consumer = %id, error = %err, "failed to remove consumer file");
        }
        Ok(true)
    }

    fn count(&self) -> Result<usize> {
        Ok(self
            .consumers
            .lock()
            .map_err(|_| Error::storage("consumer registry lock poisoned"))?
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventline_events::EventId;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn consumer(topic: &str) -> Consumer {
        let mut topics = BTreeMap::new();
        topics.insert(topic.to_string(), None);
        Consumer::new("http://example.com/hook", topics)
    }

    #[test]
    fn registry_survives_restart() {
        let dir = TempDir::new().unwrap();
        let c = consumer("user-events");
        {
            let registry = FileSystemConsumerRegistry::new(dir.path()).unwrap();
            registry.save(c.clone()).unwrap();
        }

        let registry = FileSystemConsumerRegistry::new(dir.path()).unwrap();
        assert_eq!(registry.count().unwrap(), 1);
        assert_eq!(registry.find_by_id(&c.id).unwrap().unwrap(), c);
    }

    #[test]
    fn cursor_updates_are_durable() {
        let dir = TempDir::new().unwrap();
        let mut c = consumer("user-events");
        {
            let registry = FileSystemConsumerRegistry::new(dir.path()).unwrap();
            registry.save(c.clone()).unwrap();
            c.advance_cursor("user-events", EventId::new("user-events", 9));
            registry.save(c.clone()).unwrap();
        }

        let registry = FileSystemConsumerRegistry::new(dir.path()).unwrap();
        let stored = registry.find_by_id(&c.id).unwrap().unwrap();
        assert_eq!(stored.cursor("user-events").unwrap().sequence(), 9);
    }

    #[test]
    fn delete_removes_the_file() {
        let dir = TempDir::new().unwrap();
        let registry = FileSystemConsumerRegistry::new(dir.path()).unwrap();
        let c = consumer("user-events");
        registry.save(c.clone()).unwrap();
        assert!(registry.delete(&c.id).unwrap());
        assert!(!dir.path().join(format!("{}.json", c.id)).exists());

        let reloaded = FileSystemConsumerRegistry::new(dir.path()).unwrap();
        assert_eq!(reloaded.count().unwrap(), 0);
    }

    #[test]
    fn malformed_files_are_skipped_on_load() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), b"{ nope").unwrap();
        let registry = FileSystemConsumerRegistry::new(dir.path()).unwrap();
        assert_eq!(registry.count().unwrap(), 0);
    }
}
