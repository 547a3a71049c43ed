//! Event ingestion.

use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use eventline_infra::publisher::PublishRequest;

use crate::app::AppServices;
use crate::errors;

use super::ScopeQuery;

#[derive(Debug, Deserialize)]
pub(crate) struct PublishItem {
    topic: String,
    #[serde(rename = "type")]
    event_type: String,
    payload: serde_json::Value,
}

/// POST /events?tenant=&namespace=: publish an array of
/// `{topic, type, payload}`. Empty arrays are rejected. Response:
/// `{"eventIds": [...]}`.
pub async fn publish(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ScopeQuery>,
    Json(items): Json<Vec<PublishItem>>,
) -> Response {
    let scope = match query.resolve() {
        Ok(scope) => scope,
        Err(err) => return errors::error_response(&err),
    };

    let requests: Vec<PublishRequest> = items
        .into_iter()
        .map(|item| PublishRequest {
            topic: item.topic,
            event_type: item.event_type,
            payload: item.payload,
        })
        .collect();

    match services.publisher.publish(requests, &scope) {
        Ok(ids) => Json(json!({
            "eventIds": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(err) => errors::error_response(&err),
    }
}
