//! Event identity and the persisted event record.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use eventline_core::{Error, Result, TopicScope};

/// Identifier of a published event.
///
/// Canonical textual form is `<topic>-<sequence>`; events on scoped topics
/// carry a `<tenant>/<namespace>/` prefix. The sequence is the per-topic
/// monotonic counter assigned at publish time, so ids order events within a
/// topic; across topics, ordering is lexicographic by topic first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventId {
    topic: String,
    sequence: i64,
    tenant_id: Option<String>,
    namespace_id: Option<String>,
}

impl EventId {
    pub fn new(topic: impl Into<String>, sequence: i64) -> Self {
        Self {
            topic: topic.into(),
            sequence,
            tenant_id: None,
            namespace_id: None,
        }
    }

    /// Build an id under the given scope.
    pub fn in_scope(scope: &TopicScope, topic: impl Into<String>, sequence: i64) -> Self {
        match scope.segments() {
            None => Self::new(topic, sequence),
            Some((tenant, namespace)) => Self {
                topic: topic.into(),
                sequence,
                tenant_id: Some(tenant.to_string()),
                namespace_id: Some(namespace.to_string()),
            },
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn namespace_id(&self) -> Option<&str> {
        self.namespace_id.as_deref()
    }

    /// Unscoped `<topic>-<sequence>` form; used as the stem of the event's
    /// file name (the scope is already encoded in the directory path).
    pub fn value(&self) -> String {
        format!("{}-{}", self.topic, self.sequence)
    }

    /// Order per the engine contract: topic lexicographically, then sequence.
    pub fn compare(&self, other: &EventId) -> Ordering {
        self.cmp(other)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.tenant_id, &self.namespace_id) {
            (Some(tenant), Some(namespace)) => {
                write!(f, "{tenant}/{namespace}/{}-{}", self.topic, self.sequence)
            }
            _ => write!(f, "{}-{}", self.topic, self.sequence),
        }
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (scope, rest) = match s.split('/').collect::<Vec<_>>().as_slice() {
            [rest] => (TopicScope::Default, *rest),
            [tenant, namespace, rest] if !tenant.is_empty() && !namespace.is_empty() => {
                (TopicScope::scoped(*tenant, *namespace), *rest)
            }
            _ => {
                return Err(Error::invalid_argument(format!(
                    "malformed event id: {s:?}"
                )));
            }
        };

        // The topic name may itself contain dashes; the sequence is whatever
        // follows the last one.
        let (topic, sequence) = rest
            .rsplit_once('-')
            .ok_or_else(|| Error::invalid_argument(format!("malformed event id: {s:?}")))?;
        if topic.is_empty() {
            return Err(Error::invalid_argument(format!("malformed event id: {s:?}")));
        }
        let sequence: i64 = sequence
            .parse()
            .map_err(|_| Error::invalid_argument(format!("malformed event id: {s:?}")))?;

        Ok(Self::in_scope(&scope, topic, sequence))
    }
}

impl Ord for EventId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.topic
            .cmp(&other.topic)
            .then(self.sequence.cmp(&other.sequence))
            .then_with(|| self.tenant_id.cmp(&other.tenant_id))
            .then_with(|| self.namespace_id.cmp(&other.namespace_id))
    }
}

impl PartialOrd for EventId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A persisted event. Immutable once stored.
///
/// Serializes to the on-disk/webhook wire form
/// `{id, timestamp, type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(
        id: EventId,
        timestamp: DateTime<Utc>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            timestamp,
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn sequence(&self) -> i64 {
        self.id.sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn canonical_form_is_topic_dash_sequence() {
        let id = EventId::new("user-events", 1);
        assert_eq!(id.to_string(), "user-events-1");
        assert_eq!(id.value(), "user-events-1");
    }

    #[test]
    fn scoped_form_prefixes_tenant_and_namespace() {
        let scope = TopicScope::scoped("acme", "billing");
        let id = EventId::in_scope(&scope, "orders", 7);
        assert_eq!(id.to_string(), "acme/billing/orders-7");
        // The file stem stays unscoped.
        assert_eq!(id.value(), "orders-7");
    }

    #[test]
    fn parse_keeps_dashes_inside_topic_names() {
        let id: EventId = "user-events-42".parse().unwrap();
        assert_eq!(id.topic(), "user-events");
        assert_eq!(id.sequence(), 42);

        let id: EventId = "acme/billing/order-lines-3".parse().unwrap();
        assert_eq!(id.topic(), "order-lines");
        assert_eq!(id.sequence(), 3);
        assert_eq!(id.tenant_id(), Some("acme"));
        assert_eq!(id.namespace_id(), Some("billing"));
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!("".parse::<EventId>().is_err());
        assert!("nodasher".parse::<EventId>().is_err());
        assert!("topic-notanumber".parse::<EventId>().is_err());
        assert!("a/b".parse::<EventId>().is_err());
        assert!("-5".parse::<EventId>().is_err());
    }

    #[test]
    fn ordering_is_topic_then_sequence() {
        let a1 = EventId::new("a", 10);
        let a2 = EventId::new("a", 2);
        let b1 = EventId::new("b", 1);
        assert!(a2 < a1);
        assert!(a1 < b1);
        assert!(a2 < b1);
    }

    #[test]
    fn serde_uses_textual_form() {
        let id = EventId::new("user-events", 2);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"user-events-2\"");
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    proptest! {
        #[test]
        fn display_parse_roundtrip(topic in "[a-z][a-z0-9-]{0,20}[a-z0-9]", seq in 0i64..1_000_000_000) {
            let id = EventId::new(topic, seq);
            let parsed: EventId = id.to_string().parse().unwrap();
            prop_assert_eq!(parsed, id);
        }

        #[test]
        fn sequence_orders_within_a_topic(a in 0i64..100_000, b in 0i64..100_000) {
            let x = EventId::new("t", a);
            let y = EventId::new("t", b);
            prop_assert_eq!(x.cmp(&y), a.cmp(&b));
        }
    }
}
