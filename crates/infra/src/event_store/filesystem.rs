//! Hierarchical filesystem event store.
//!
//! An event with sequence `s` lives at
//! `<root>/<tenant>/<namespace>/<topic>/<g1>/<g2>/<g3>/<topic>-<s>.json`
//! where `g1 = s / 1_000_000` (3 digits), `g2 = (s / 10_000) % 100` and
//! `g3 = (s / 100) % 100` (2 digits each). The default scope omits the
//! tenant/namespace segments. Grouping keeps directories small at any stream
//! length and lets retrieval prune whole groups against `since_event_id`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

use eventline_core::{Error, Result, TopicScope};
use eventline_events::{Event, EventId};

use super::query::EventQuery;
use super::{EventStore, EventWrite};

const GROUP_1_SPAN: i64 = 1_000_000;
const GROUP_2_SPAN: i64 = 10_000;
const GROUP_3_SPAN: i64 = 100;

pub struct FileSystemEventStore {
    root: PathBuf,
    zone: FixedOffset,
}

impl FileSystemEventStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_zone(root, Utc.fix())
    }

    /// Store whose `date` filter evaluates in the given zone.
    pub fn with_zone(root: impl Into<PathBuf>, zone: FixedOffset) -> Self {
        Self {
            root: root.into(),
            zone,
        }
    }

    fn topic_dir(&self, topic: &str, scope: &TopicScope) -> PathBuf {
        match scope.segments() {
            None => self.root.join(topic),
            Some((tenant, namespace)) => self.root.join(tenant).join(namespace).join(topic),
        }
    }

    fn group_segments(sequence: i64) -> (String, String, String) {
        (
            format!("{:03}", sequence / GROUP_1_SPAN),
            format!("{:02}", (sequence / GROUP_2_SPAN) % 100),
            format!("{:02}", (sequence / GROUP_3_SPAN) % 100),
        )
    }

    fn event_path(&self, topic: &str, sequence: i64, scope: &TopicScope) -> PathBuf {
        let (g1, g2, g3) = Self::group_segments(sequence);
        self.topic_dir(topic, scope)
            .join(g1)
            .join(g2)
            .join(g3)
            .join(format!("{topic}-{sequence}.json"))
    }

    fn write_event_file(&self, path: &Path, event: &Event) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::storage(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(parent).map_err(Error::storage)?;

        let body = serde_json::to_vec(event).map_err(Error::storage)?;

        // Write-then-rename keeps readers from ever seeing a torn file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(Error::storage)?;
        fs::rename(&tmp, path).map_err(Error::storage)?;
        Ok(())
    }

    fn read_event_file(path: &Path) -> Option<Event> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable event file");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping malformed event file");
                None
            }
        }
    }

    /// Numeric child directories, parsed and sorted.
    fn numeric_dirs(dir: &Path, ascending: bool) -> Vec<(i64, PathBuf)> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut dirs: Vec<(i64, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if !path.is_dir() {
                    return None;
                }
                let value: i64 = entry.file_name().to_str()?.parse().ok()?;
                Some((value, path))
            })
            .collect();
        dirs.sort_by_key(|(value, _)| *value);
        if !ascending {
            dirs.reverse();
        }
        dirs
    }

    /// Leaf event files, as (sequence, path), sorted by sequence.
    ///
    /// File names sort lexicographically, which is not numeric order, so the
    /// sequence is parsed from each stem.
    fn leaf_files(dir: &Path, ascending: bool) -> Vec<(i64, PathBuf)> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<(i64, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?;
                let id: EventId = stem.parse().ok()?;
                Some((id.sequence(), path))
            })
            .collect();
        files.sort_by_key(|(seq, _)| *seq);
        if !ascending {
            files.reverse();
        }
        files
    }
}

impl EventStore for FileSystemEventStore {
    fn store_event(&self, write: EventWrite, scope: &TopicScope) -> Result<Event> {
        let path = self.event_path(&write.topic, write.event_id.sequence(), scope);
        let event = write.into_event();
        self.write_event_file(&path, &event)?;
        Ok(event)
    }

    fn store_events(&self, writes: Vec<EventWrite>, scope: &TopicScope) -> Result<Vec<Event>> {
        if writes.is_empty() {
            return Err(Error::invalid_argument("empty event batch"));
        }

        let mut stored: Vec<(PathBuf, Event)> = Vec::with_capacity(writes.len());
        for write in writes {
            let path = self.event_path(&write.topic, write.event_id.sequence(), scope);
            let event = write.into_event();
            if let Err(err) = self.write_event_file(&path, &event) {
                // Roll back what this batch already wrote, best effort.
                for (written, _) in &stored {
                    if let Err(cleanup) = fs::remove_file(written) {
                        warn!(
                            path = %written.display(),
                            error = %cleanup,
                            "failed to clean up partial batch"
                        );
                    }
                }
                return Err(err);
            }
            stored.push((path, event));
        }

        Ok(stored.into_iter().map(|(_, event)| event).collect())
    }

    fn get_event(
        &self,
        topic: &str,
        event_id: &EventId,
        scope: &TopicScope,
    ) -> Result<Option<Event>> {
        let path = self.event_path(topic, event_id.sequence(), scope);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Self::read_event_file(&path))
    }

    fn get_events(
        &self,
        topic: &str,
        query: &EventQuery,
        scope: &TopicScope,
    ) -> Result<Vec<Event>> {
        let topic_dir = self.topic_dir(topic, scope);
        if !topic_dir.exists() {
            return Ok(Vec::new());
        }

        let min_seq = query.min_sequence();
        let mut out = Vec::new();

        // Traversal is in ascending sequence order, so `limit` can stop the
        // walk instead of buffering every match.
        'walk: for (g1, g1_path) in Self::numeric_dirs(&topic_dir, true) {
            if (g1 + 1) * GROUP_1_SPAN - 1 < min_seq {
                continue;
            }
            for (g2, g2_path) in Self::numeric_dirs(&g1_path, true) {
                let g2_base = g1 * GROUP_1_SPAN + g2 * GROUP_2_SPAN;
                if g2_base + GROUP_2_SPAN - 1 < min_seq {
                    continue;
                }
                for (g3, g3_path) in Self::numeric_dirs(&g2_path, true) {
                    let g3_base = g2_base + g3 * GROUP_3_SPAN;
                    if g3_base + GROUP_3_SPAN - 1 < min_seq {
                        continue;
                    }
                    for (sequence, path) in Self::leaf_files(&g3_path, true) {
                        if sequence < min_seq {
                            continue;
                        }
                        let Some(event) = Self::read_event_file(&path) else {
                            continue;
                        };
                        if !query.matches(&event, &self.zone) {
                            continue;
                        }
                        out.push(event);
                        if let Some(limit) = query.limit
                            && limit > 0
                            && out.len() >= limit
                        {
                            break 'walk;
                        }
                    }
                }
            }
        }

        // Traversal already yields sequence order; the date filter reorders
        // nothing but the contract calls for an explicit sort after it.
        if query.date.is_some() {
            out.sort_by(|a, b| a.id.compare(&b.id));
        }

        Ok(out)
    }

    fn get_latest_event_id(&self, topic: &str, scope: &TopicScope) -> Result<Option<EventId>> {
        let topic_dir = self.topic_dir(topic, scope);
        if !topic_dir.exists() {
            return Ok(None);
        }

        // Descend the maximal group path; empty or stray directories fall
        // through to the next candidate.
        for (_, g1_path) in Self::numeric_dirs(&topic_dir, false) {
            for (_, g2_path) in Self::numeric_dirs(&g1_path, false) {
                for (_, g3_path) in Self::numeric_dirs(&g2_path, false) {
                    if let Some((_, path)) = Self::leaf_files(&g3_path, false).into_iter().next()
                        && let Some(event) = Self::read_event_file(&path)
                    {
                        return Ok(Some(event.id));
                    }
                }
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(topic: &str, seq: i64, scope: &TopicScope) -> EventWrite {
        write_at(topic, seq, scope, Utc::now())
    }

    fn write_at(
        topic: &str,
        seq: i64,
        scope: &TopicScope,
        timestamp: DateTime<Utc>,
    ) -> EventWrite {
        EventWrite {
            topic: topic.to_string(),
            event_type: "t.happened".to_string(),
            payload: json!({"seq": seq}),
            event_id: EventId::in_scope(scope, topic, seq),
            timestamp,
        }
    }

    #[test]
    fn layout_matches_the_grouping_scheme() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemEventStore::new(dir.path());
        let scope = TopicScope::Default;

        store
            .store_event(write("t", 1_234_567, &scope), &scope)
            .unwrap();

        let expected = dir
            .path()
            .join("t")
            .join("001")
            .join("23")
            .join("45")
            .join("t-1234567.json");
        assert!(expected.is_file(), "missing {}", expected.display());
    }

    #[test]
    fn scoped_layout_adds_tenant_and_namespace_segments() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemEventStore::new(dir.path());
        let scope = TopicScope::scoped("acme", "billing");

        store.store_event(write("orders", 1, &scope), &scope).unwrap();

        let expected = dir
            .path()
            .join("acme")
            .join("billing")
            .join("orders")
            .join("000")
            .join("00")
            .join("00")
            .join("orders-1.json");
        assert!(expected.is_file());
    }

    #[test]
    fn roundtrip_and_latest() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemEventStore::new(dir.path());
        let scope = TopicScope::Default;

        for seq in 1..=5 {
            store.store_event(write("t", seq, &scope), &scope).unwrap();
        }

        let id = EventId::new("t", 3);
        let event = store.get_event("t", &id, &scope).unwrap().unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.payload, json!({"seq": 3}));

        let events = store.get_events("t", &EventQuery::all(), &scope).unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(
            store.get_latest_event_id("t", &scope).unwrap(),
            Some(EventId::new("t", 5))
        );
        assert_eq!(events.last().unwrap().id, EventId::new("t", 5));
    }

    #[test]
    fn sequence_order_is_numeric_not_lexicographic() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemEventStore::new(dir.path());
        let scope = TopicScope::Default;

        // "t-10" sorts before "t-2" as a string.
        for seq in [2, 10, 1] {
            store.store_event(write("t", seq, &scope), &scope).unwrap();
        }

        let sequences: Vec<i64> = store
            .get_events("t", &EventQuery::all(), &scope)
            .unwrap()
            .iter()
            .map(|e| e.sequence())
            .collect();
        assert_eq!(sequences, vec![1, 2, 10]);
    }

    #[test]
    fn since_filter_prunes_and_limits_early() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemEventStore::new(dir.path());
        let scope = TopicScope::Default;

        for seq in 1..=300 {
            store.store_event(write("t", seq, &scope), &scope).unwrap();
        }

        let query = EventQuery::all().since(EventId::new("t", 150)).limit(10);
        let sequences: Vec<i64> = store
            .get_events("t", &query, &scope)
            .unwrap()
            .iter()
            .map(|e| e.sequence())
            .collect();
        assert_eq!(sequences, (151..=160).collect::<Vec<_>>());
    }

    #[test]
    fn date_filter_selects_local_day() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemEventStore::new(dir.path());
        let scope = TopicScope::Default;

        store
            .store_event(
                write_at("t", 1, &scope, "2024-05-01T08:00:00Z".parse().unwrap()),
                &scope,
            )
            .unwrap();
        store
            .store_event(
                write_at("t", 2, &scope, "2024-05-02T08:00:00Z".parse().unwrap()),
                &scope,
            )
            .unwrap();

        let query = EventQuery::all().on_date("2024-05-02".parse().unwrap());
        let events = store.get_events("t", &query, &scope).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence(), 2);
    }

    #[test]
    fn malformed_file_is_skipped_with_a_log_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemEventStore::new(dir.path());
        let scope = TopicScope::Default;

        let leaf = dir.path().join("t").join("000").join("00").join("00");
        fs::create_dir_all(&leaf).unwrap();
        fs::write(leaf.join("t-1.json"), b"{ invalid json }").unwrap();

        let events = store.get_events("t", &EventQuery::all(), &scope).unwrap();
        assert!(events.is_empty());
        assert!(store.get_event("t", &EventId::new("t", 1), &scope).unwrap().is_none());
    }

    #[test]
    fn failed_batch_cleans_up_already_written_events() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemEventStore::new(dir.path());
        let scope = TopicScope::Default;

        // Pre-create the second event's path as a directory so its write fails.
        let blocker = store.event_path("t", 2, &scope);
        fs::create_dir_all(&blocker).unwrap();

        let result = store.store_events(
            vec![write("t", 1, &scope), write("t", 2, &scope)],
            &scope,
        );
        assert!(matches!(result, Err(Error::Storage(_))));
        assert!(!store.event_path("t", 1, &scope).exists());
    }

    #[test]
    fn missing_topic_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemEventStore::new(dir.path());
        let scope = TopicScope::Default;

        assert!(store.get_events("nope", &EventQuery::all(), &scope).unwrap().is_empty());
        assert!(store.get_latest_event_id("nope", &scope).unwrap().is_none());
    }
}
