//! Per-topic delivery worker.
//!
//! One worker task per qualified topic name. Each tick discovers the topic's
//! subscribers and drains new events to them in batches, advancing cursors
//! only on HTTP 2xx. Deliveries for a (consumer, topic) pair are serialized
//! by construction; no lock is held across the HTTP call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use eventline_core::{ConsumerId, TopicScope};
use eventline_events::{Consumer, Event};

use crate::consumers::ConsumerRegistry;
use crate::event_store::{EventQuery, EventStore};

use super::retry::RetryState;
use super::{DispatcherConfig, ExhaustedPolicy};

/// Outbound webhook body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookDelivery<'a> {
    consumer_id: ConsumerId,
    events: &'a [Event],
}

pub(crate) struct WorkerContext {
    pub qualified_topic: String,
    pub registry: Arc<dyn ConsumerRegistry>,
    pub store: Arc<dyn EventStore>,
    pub client: reqwest::Client,
    pub config: DispatcherConfig,
}

enum Outcome {
    /// All pending events delivered (possibly none).
    Drained,
    /// A delivery or registry operation failed; back off.
    Failed,
}

pub(crate) async fn run(
    ctx: WorkerContext,
    mut nudge: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(ctx.config.tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut retries: HashMap<ConsumerId, RetryState> = HashMap::new();

    debug!(topic = %ctx.qualified_topic, "dispatcher worker started");
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            Some(_) = nudge.recv() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }
        tick(&ctx, &mut retries).await;
    }
    debug!(topic = %ctx.qualified_topic, "dispatcher worker stopped");
}

async fn tick(ctx: &WorkerContext, retries: &mut HashMap<ConsumerId, RetryState>) {
    let consumers = match ctx.registry.find_by_topic(&ctx.qualified_topic) {
        Ok(consumers) => consumers,
        Err(err) => {
            warn!(topic = %ctx.qualified_topic, error = %err, "consumer lookup failed; retrying next tick");
            return;
        }
    };

    let (scope, topic) = match TopicScope::parse_qualified(&ctx.qualified_topic) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(topic = %ctx.qualified_topic, error = %err, "unroutable topic name");
            return;
        }
    };

    for consumer in consumers {
        let due = retries
            .get(&consumer.id)
            .is_none_or(|state| state.due(Instant::now()));
        if !due {
            continue;
        }

        let id = consumer.id;
        match drain_consumer(ctx, &scope, &topic, consumer).await {
            Outcome::Drained => {
                retries.remove(&id);
            }
            Outcome::Failed => {
                let state = retries.entry(id).or_default();
                state.attempts += 1;
                if ctx.config.retry.exhausted(state.attempts) {
                    match ctx.config.exhausted_policy {
                        ExhaustedPolicy::Park => {
                            state.parked = true;
                            warn!(
                                topic = %ctx.qualified_topic,
                                consumer = %id,
                                attempts = state.attempts,
                                "retry budget exhausted; consumer parked"
                            );
                        }
                        ExhaustedPolicy::Remove => {
                            retries.remove(&id);
                            warn!(
                                topic = %ctx.qualified_topic,
                                consumer = %id,
                                "retry budget exhausted; removing consumer"
                            );
                            if let Err(err) = ctx.registry.delete(&id) {
                                warn!(consumer = %id, error = %err, "failed to remove consumer");
                            }
                        }
                    }
                } else {
                    let delay = ctx.config.retry.backoff(state.attempts);
                    state.next_attempt = Some(Instant::now() + delay);
                    debug!(
                        topic = %ctx.qualified_topic,
                        consumer = %id,
                        attempt = state.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "delivery failed; backing off"
                    );
                }
            }
        }
    }
}

/// Deliver every pending batch to one consumer, in sequence order.
async fn drain_consumer(
    ctx: &WorkerContext,
    scope: &TopicScope,
    topic: &str,
    mut consumer: Consumer,
) -> Outcome {
    loop {
        let query = EventQuery::all()
            .since_opt(consumer.cursor(&ctx.qualified_topic).cloned())
            .limit(ctx.config.batch_size);
        let events = match ctx.store.get_events(topic, &query, scope) {
            Ok(events) => events,
            Err(err) => {
                warn!(topic = %ctx.qualified_topic, error = %err, "event fetch failed");
                return Outcome::Failed;
            }
        };
        let Some(last) = events.last().map(|e| e.id.clone()) else {
            return Outcome::Drained;
        };

        let body = WebhookDelivery {
            consumer_id: consumer.id,
            events: &events,
        };
        let response = ctx
            .client
            .post(&consumer.callback_url)
            .timeout(ctx.config.delivery_timeout)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                consumer.advance_cursor(&ctx.qualified_topic, last);
                if let Err(err) = ctx.registry.save(consumer.clone()) {
                    warn!(consumer = %consumer.id, error = %err, "cursor persist failed");
                    return Outcome::Failed;
                }
            }
            Ok(response) => {
                warn!(
                    topic = %ctx.qualified_topic,
                    consumer = %consumer.id,
                    status = %response.status(),
                    "webhook rejected delivery"
                );
                return Outcome::Failed;
            }
            Err(err) => {
                warn!(
                    topic = %ctx.qualified_topic,
                    consumer = %consumer.id,
                    error = %err,
                    "webhook unreachable"
                );
                return Outcome::Failed;
            }
        }
    }
}
