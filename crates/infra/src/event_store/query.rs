//! Retrieval filters for `get_events`.

use chrono::{FixedOffset, NaiveDate};

use eventline_events::{Event, EventId};

/// Conjunctive filters over a topic's event stream.
///
/// - `since_event_id` keeps events strictly after the given id.
/// - `date` keeps events whose timestamp falls on that local date, evaluated
///   in the store's configured time zone (UTC by default).
/// - `limit` keeps the N lowest-sequence survivors; stores must not buffer
///   unbounded matches when it is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    pub since_event_id: Option<EventId>,
    pub date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(mut self, event_id: EventId) -> Self {
        self.since_event_id = Some(event_id);
        self
    }

    pub fn since_opt(mut self, event_id: Option<EventId>) -> Self {
        self.since_event_id = event_id;
        self
    }

    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an event passes the non-limit filters.
    pub fn matches(&self, event: &Event, zone: &FixedOffset) -> bool {
        if let Some(since) = &self.since_event_id
            && event.id.compare(since) != std::cmp::Ordering::Greater
        {
            return false;
        }
        if let Some(date) = &self.date
            && event.timestamp.with_timezone(zone).date_naive() != *date
        {
            return false;
        }
        true
    }

    /// Smallest sequence that can still match, derived from `since_event_id`.
    /// Used by the filesystem store to prune group directories.
    pub fn min_sequence(&self) -> i64 {
        self.since_event_id
            .as_ref()
            .map(|id| id.sequence() + 1)
            .unwrap_or(0)
    }
}
