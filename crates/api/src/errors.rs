//! Engine error → HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use eventline_core::Error;

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"error": code, "message": message.into()})),
    )
        .into_response()
}

pub fn error_response(err: &Error) -> Response {
    let (status, code) = match err {
        Error::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        Error::InvalidEventPayload { .. } => (StatusCode::BAD_REQUEST, "validation_failed"),
        Error::TopicNotFound(_) | Error::ConsumerNotFound(_) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        Error::TopicAlreadyExists(_) => (StatusCode::CONFLICT, "conflict"),
        Error::Storage(_) | Error::Config(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "storage_failure")
        }
        Error::Delivery(_) => (StatusCode::BAD_GATEWAY, "delivery_failure"),
    };
    json_error(status, code, err.to_string())
}
