//! Webhook consumer registration and management.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use eventline_core::{ConsumerId, Error};
use eventline_events::EventId;
use eventline_infra::consumers::{ConsumerRegistry, register_consumer};

use crate::app::AppServices;
use crate::errors;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_consumers).post(create_consumer))
        .route("/:id", get(get_consumer).delete(delete_consumer))
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    callback: String,
    /// Qualified topic name -> last delivered event id (null = from the
    /// beginning).
    topics: BTreeMap<String, Option<String>>,
}

/// POST /consumers. Response: `{"consumerId": "..."}`.
async fn create_consumer(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RegisterBody>,
) -> Response {
    let mut subscriptions = BTreeMap::new();
    for (topic, cursor) in body.topics {
        let cursor = match cursor.as_deref().map(str::parse::<EventId>) {
            None => None,
            Some(Ok(id)) => Some(id),
            Some(Err(err)) => return errors::error_response(&err),
        };
        subscriptions.insert(topic, cursor);
    }

    match register_consumer(
        services.consumers.as_ref(),
        &services.registry,
        &body.callback,
        subscriptions,
    ) {
        Ok(consumer) => {
            // Wake delivery for every subscribed topic so catch-up starts now.
            for qualified in consumer.topics.keys() {
                services.dispatcher.notify_published(qualified);
            }
            (
                StatusCode::CREATED,
                Json(json!({"consumerId": consumer.id.to_string()})),
            )
                .into_response()
        }
        Err(err) => errors::error_response(&err),
    }
}

/// GET /consumers
async fn list_consumers(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.consumers.find_all() {
        Ok(consumers) => Json(consumers).into_response(),
        Err(err) => errors::error_response(&err),
    }
}

/// GET /consumers/:id
async fn get_consumer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: ConsumerId = match id.parse() {
        Ok(id) => id,
        Err(err) => return errors::error_response(&err),
    };
    match services.consumers.find_by_id(&id) {
        Ok(Some(consumer)) => Json(consumer).into_response(),
        Ok(None) => errors::error_response(&Error::consumer_not_found(id)),
        Err(err) => errors::error_response(&err),
    }
}

/// DELETE /consumers/:id
async fn delete_consumer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: ConsumerId = match id.parse() {
        Ok(id) => id,
        Err(err) => return errors::error_response(&err),
    };
    match services.consumers.delete(&id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => errors::error_response(&Error::consumer_not_found(id)),
        Err(err) => errors::error_response(&err),
    }
}
