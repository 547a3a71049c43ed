//! Asynchronous webhook dispatcher.
//!
//! One tokio task per qualified topic name tails that topic and pushes new
//! events to its subscribers. Publishers nudge the worker for an immediate
//! tick; otherwise it polls on a base interval. Delivery is at-least-once:
//! consumers must be idempotent on event id.

pub mod retry;
pub(crate) mod worker;

pub use retry::RetryPolicy;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use eventline_core::Result;

use crate::consumers::ConsumerRegistry;
use crate::event_store::EventStore;

/// What to do with a consumer whose retry budget is exhausted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExhaustedPolicy {
    /// Keep the consumer registered but stop delivering until restart.
    Park,
    /// Drop the consumer from the registry.
    Remove,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Base poll interval per topic worker.
    pub tick_interval: Duration,
    /// Max events per webhook POST.
    pub batch_size: usize,
    /// Timeout for a single webhook POST.
    pub delivery_timeout: Duration,
    pub retry: RetryPolicy,
    pub exhausted_policy: ExhaustedPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            batch_size: 100,
            delivery_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            exhausted_policy: ExhaustedPolicy::Park,
        }
    }
}

struct WorkerHandle {
    nudge: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

/// Owns the per-topic worker tasks.
pub struct Dispatcher {
    registry: Arc<dyn ConsumerRegistry>,
    store: Arc<dyn EventStore>,
    client: reqwest::Client,
    config: DispatcherConfig,
    workers: Mutex<HashMap<String, WorkerHandle>>,
    shutdown: watch::Sender<bool>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn ConsumerRegistry>,
        store: Arc<dyn EventStore>,
        config: DispatcherConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            store,
            client: reqwest::Client::new(),
            config,
            workers: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Spawn workers for every topic that already has subscribers, so
    /// consumers catch up without waiting for the next publish.
    pub fn start(&self) -> Result<()> {
        for consumer in self.registry.find_all()? {
            for qualified in consumer.topics.keys() {
                self.ensure_worker(qualified);
            }
        }
        Ok(())
    }

    /// Make sure a worker exists for the topic. Must run inside a tokio
    /// runtime.
    pub fn ensure_worker(&self, qualified_topic: &str) {
        let Ok(mut workers) = self.workers.lock() else {
            warn!("dispatcher worker table lock poisoned");
            return;
        };
        if workers.contains_key(qualified_topic) {
            return;
        }

        let (nudge_tx, nudge_rx) = mpsc::channel(16);
        let ctx = worker::WorkerContext {
            qualified_topic: qualified_topic.to_string(),
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            client: self.client.clone(),
            config: self.config.clone(),
        };
        let join = tokio::spawn(worker::run(ctx, nudge_rx, self.shutdown.subscribe()));
        workers.insert(
            qualified_topic.to_string(),
            WorkerHandle {
                nudge: nudge_tx,
                join,
            },
        );
    }

    /// Publisher-side nudge: wake the topic's worker for an immediate tick.
    pub fn notify_published(&self, qualified_topic: &str) {
        self.ensure_worker(qualified_topic);
        if let Ok(workers) = self.workers.lock()
            && let Some(handle) = workers.get(qualified_topic)
        {
            // A full nudge queue already guarantees a prompt tick.
            let _ = handle.nudge.try_send(());
        }
    }

    /// Qualified names of topics with a running worker.
    pub fn running_topics(&self) -> Vec<String> {
        self.workers
            .lock()
            .map(|workers| workers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Signal every worker and wait for them to wind down. In-flight
    /// deliveries finish or are abandoned without advancing cursors.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handles: Vec<WorkerHandle> = match self.workers.lock() {
            Ok(mut workers) => workers.drain().map(|(_, handle)| handle).collect(),
            Err(_) => return,
        };
        for handle in handles {
            let _ = handle.join.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::InMemoryConsumerRegistry;
    use crate::event_store::{EventWrite, InMemoryEventStore};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::Utc;
    use eventline_core::TopicScope;
    use eventline_events::{Consumer, EventId};
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Receiver {
        bodies: Mutex<Vec<Value>>,
        fail_remaining: AtomicU32,
    }

    async fn webhook(
        State(state): State<Arc<Receiver>>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let remaining = state.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            state.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        state.bodies.lock().unwrap().push(body);
        StatusCode::OK
    }

    async fn spawn_receiver(fail_first: u32) -> (String, Arc<Receiver>) {
        let state = Arc::new(Receiver {
            bodies: Mutex::new(Vec::new()),
            fail_remaining: AtomicU32::new(fail_first),
        });
        let app = Router::new()
            .route("/webhook", post(webhook))
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/webhook"), state)
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            tick_interval: Duration::from_millis(25),
            batch_size: 100,
            delivery_timeout: Duration::from_secs(2),
            retry: RetryPolicy {
                base: Duration::from_millis(10),
                cap: Duration::from_millis(50),
                max_attempts: 8,
            },
            exhausted_policy: ExhaustedPolicy::Park,
        }
    }

    fn seed_store(topic: &str, count: i64) -> Arc<InMemoryEventStore> {
        let store = Arc::new(InMemoryEventStore::new());
        let scope = TopicScope::Default;
        for seq in 1..=count {
            store
                .store_event(
                    EventWrite {
                        topic: topic.to_string(),
                        event_type: "note.posted".to_string(),
                        payload: json!({"n": seq}),
                        event_id: EventId::new(topic, seq),
                        timestamp: Utc::now(),
                    },
                    &scope,
                )
                .unwrap();
        }
        store
    }

    fn subscribe(registry: &InMemoryConsumerRegistry, url: &str, topic: &str, cursor: Option<EventId>) -> Consumer {
        let mut topics = BTreeMap::new();
        topics.insert(topic.to_string(), cursor);
        let consumer = Consumer::new(url, topics);
        registry.save(consumer.clone()).unwrap();
        consumer
    }

    async fn wait_until(mut check: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn delivers_from_the_beginning_and_advances_the_cursor() {
        let (url, receiver) = spawn_receiver(0).await;
        let registry = Arc::new(InMemoryConsumerRegistry::new());
        let store = seed_store("user-events", 2);
        let consumer = subscribe(&registry, &url, "user-events", None);

        let dispatcher = Dispatcher::new(registry.clone(), store, fast_config());
        dispatcher.notify_published("user-events");

        assert!(
            wait_until(
                || !receiver.bodies.lock().unwrap().is_empty(),
                Duration::from_secs(2),
            )
            .await
        );

        let bodies = receiver.bodies.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["consumerId"], json!(consumer.id.to_string()));
        let ids: Vec<&str> = bodies[0]["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["user-events-1", "user-events-2"]);

        let stored = registry.find_by_id(&consumer.id).unwrap().unwrap();
        assert_eq!(stored.cursor("user-events").unwrap().sequence(), 2);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn cursor_midpoint_skips_already_delivered_events() {
        let (url, receiver) = spawn_receiver(0).await;
        let registry = Arc::new(InMemoryConsumerRegistry::new());
        let store = seed_store("t", 3);
        // Cursor at B: only C is pending.
        subscribe(&registry, &url, "t", Some(EventId::new("t", 2)));

        let dispatcher = Dispatcher::new(registry.clone(), store, fast_config());
        dispatcher.ensure_worker("t");

        assert!(
            wait_until(
                || !receiver.bodies.lock().unwrap().is_empty(),
                Duration::from_secs(2),
            )
            .await
        );
        // Give a second tick a chance to (incorrectly) redeliver.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let bodies = receiver.bodies.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        let events = bodies[0]["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["id"], json!("t-3"));

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn batches_preserve_sequence_order() {
        let (url, receiver) = spawn_receiver(0).await;
        let registry = Arc::new(InMemoryConsumerRegistry::new());
        let store = seed_store("t", 3);
        subscribe(&registry, &url, "t", None);

        let mut config = fast_config();
        config.batch_size = 1;
        let dispatcher = Dispatcher::new(registry.clone(), store, config);
        dispatcher.notify_published("t");

        assert!(
            wait_until(
                || receiver.bodies.lock().unwrap().len() >= 3,
                Duration::from_secs(2),
            )
            .await
        );

        let bodies = receiver.bodies.lock().unwrap().clone();
        let ids: Vec<String> = bodies
            .iter()
            .map(|b| b["events"][0]["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["t-1", "t-2", "t-3"]);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn failed_deliveries_retry_without_advancing_the_cursor() {
        let (url, receiver) = spawn_receiver(2).await;
        let registry = Arc::new(InMemoryConsumerRegistry::new());
        let store = seed_store("t", 1);
        let consumer = subscribe(&registry, &url, "t", None);

        let dispatcher = Dispatcher::new(registry.clone(), store, fast_config());
        dispatcher.notify_published("t");

        assert!(
            wait_until(
                || !receiver.bodies.lock().unwrap().is_empty(),
                Duration::from_secs(2),
            )
            .await
        );

        // The successful redelivery carries the same event: at-least-once.
        let bodies = receiver.bodies.lock().unwrap().clone();
        assert_eq!(bodies[0]["events"][0]["id"], json!("t-1"));

        let stored = registry.find_by_id(&consumer.id).unwrap().unwrap();
        assert_eq!(stored.cursor("t").unwrap().sequence(), 1);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn exhausted_budget_parks_the_consumer_without_deleting_it() {
        let (url, receiver) = spawn_receiver(u32::MAX).await;
        let registry = Arc::new(InMemoryConsumerRegistry::new());
        let store = seed_store("t", 1);
        let consumer = subscribe(&registry, &url, "t", None);

        let mut config = fast_config();
        config.retry.max_attempts = 2;
        let dispatcher = Dispatcher::new(registry.clone(), store, config);
        dispatcher.notify_published("t");

        // Two failing attempts, then the worker parks the consumer.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let after_park = receiver.fail_remaining.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(receiver.fail_remaining.load(Ordering::SeqCst), after_park);
        assert_eq!(u32::MAX - after_park, 2);

        // Parked, not removed; cursor untouched.
        let stored = registry.find_by_id(&consumer.id).unwrap().unwrap();
        assert!(stored.cursor("t").is_none());
        assert_eq!(registry.count().unwrap(), 1);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn remove_policy_deletes_the_consumer_after_the_budget() {
        let (url, _receiver) = spawn_receiver(u32::MAX).await;
        let registry = Arc::new(InMemoryConsumerRegistry::new());
        let store = seed_store("t", 1);
        subscribe(&registry, &url, "t", None);

        let mut config = fast_config();
        config.retry.max_attempts = 2;
        config.exhausted_policy = ExhaustedPolicy::Remove;
        let dispatcher = Dispatcher::new(registry.clone(), store, config);
        dispatcher.notify_published("t");

        assert!(
            wait_until(|| registry.count().unwrap() == 0, Duration::from_secs(2)).await
        );

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_workers_within_a_tick() {
        let (url, _receiver) = spawn_receiver(0).await;
        let registry = Arc::new(InMemoryConsumerRegistry::new());
        let store = seed_store("t", 1);
        subscribe(&registry, &url, "t", None);

        let dispatcher = Dispatcher::new(registry, store, fast_config());
        dispatcher.start().unwrap();
        assert_eq!(dispatcher.running_topics(), vec!["t".to_string()]);

        dispatcher.shutdown().await;
        assert!(dispatcher.running_topics().is_empty());
    }
}
