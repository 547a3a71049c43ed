//! Liveness endpoint.

use std::sync::Arc;

use axum::extract::Extension;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use eventline_infra::consumers::ConsumerRegistry;

use crate::app::AppServices;
use crate::errors;

/// GET /health. Response: `{status, consumers, runningDispatchers}`.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.consumers.count() {
        Ok(consumers) => Json(json!({
            "status": "ok",
            "consumers": consumers,
            "runningDispatchers": services.dispatcher.running_topics(),
        }))
        .into_response(),
        Err(err) => errors::error_response(&err),
    }
}
