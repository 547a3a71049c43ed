//! Topic config persistence.
//!
//! One JSON file per topic at `<configRoot>/<tenant>/<namespace>/<topic>.json`
//! (the default scope writes directly under the root). Reads also accept the
//! legacy flat path `<configRoot>/<topic>.json` for topics created before
//! scoping existed.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use eventline_core::{Error, Result, TopicScope};
use eventline_events::Topic;

pub struct TopicConfigStore {
    root: PathBuf,
}

impl TopicConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn scoped_path(&self, name: &str, scope: &TopicScope) -> PathBuf {
        match scope.segments() {
            None => self.root.join(format!("{name}.json")),
            Some((tenant, namespace)) => self
                .root
                .join(tenant)
                .join(namespace)
                .join(format!("{name}.json")),
        }
    }

    fn legacy_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    fn read_topic(path: &Path) -> Result<Topic> {
        let bytes = fs::read(path).map_err(Error::config)?;
        serde_json::from_slice(&bytes).map_err(Error::config)
    }

    pub fn save(&self, topic: &Topic, scope: &TopicScope) -> Result<()> {
        let path = self.scoped_path(&topic.name, scope);
        let parent = path
            .parent()
            .ok_or_else(|| Error::config(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(parent).map_err(Error::config)?;

        let body = serde_json::to_vec_pretty(topic).map_err(Error::config)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(Error::config)?;
        fs::rename(&tmp, &path).map_err(Error::config)?;
        Ok(())
    }

    /// Load a topic config, falling back to the legacy flat path.
    pub fn load(&self, name: &str, scope: &TopicScope) -> Result<Option<Topic>> {
        let path = self.scoped_path(name, scope);
        if path.is_file() {
            return Self::read_topic(&path).map(Some);
        }
        if !scope.is_default() {
            let legacy = self.legacy_path(name);
            if legacy.is_file() {
                return Self::read_topic(&legacy).map(Some);
            }
        }
        Ok(None)
    }

    /// Walk the config root and load every topic with the scope its path
    /// encodes. Unparseable files are logged and skipped.
    pub fn load_all(&self) -> Result<Vec<(TopicScope, Topic)>> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }

        // Flat files under the root are default-scope (or legacy) topics.
        for entry in fs::read_dir(&self.root).map_err(Error::config)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                match Self::read_topic(&path) {
                    Ok(topic) => out.push((TopicScope::Default, topic)),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping bad topic config")
                    }
                }
            } else if path.is_dir() {
                self.load_tenant_dir(&entry.file_name().to_string_lossy(), &path, &mut out)?;
            }
        }

        Ok(out)
    }

    fn load_tenant_dir(
        &self,
        tenant: &str,
        dir: &Path,
        out: &mut Vec<(TopicScope, Topic)>,
    ) -> Result<()> {
        for ns_entry in fs::read_dir(dir).map_err(Error::config)?.flatten() {
            let ns_path = ns_entry.path();
            if !ns_path.is_dir() {
                continue;
            }
            let namespace = ns_entry.file_name().to_string_lossy().to_string();
            for entry in fs::read_dir(&ns_path).map_err(Error::config)?.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match Self::read_topic(&path) {
                    Ok(topic) => out.push((TopicScope::scoped(tenant, namespace.clone()), topic)),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping bad topic config")
                    }
                }
            }
        }
        Ok(())
    }
}
