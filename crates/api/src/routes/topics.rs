//! Topic lifecycle and filtered event reads.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;

use eventline_core::{Error, ResourceId};
use eventline_events::{EventId, Schema};
use eventline_infra::event_store::{EventQuery, EventStore};
use eventline_infra::topics::CreateTopic;

use crate::app::AppServices;
use crate::errors;

use super::ScopeQuery;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_topics).post(create_topic))
        .route("/:name", get(get_topic))
        .route("/:name/schemas", put(update_schemas))
        .route("/:name/events", get(list_events))
}

// ─────────────────────────────────────────────────────────────────────────────
// Request bodies / query parameters
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTopicBody {
    name: String,
    #[serde(default)]
    schemas: Vec<Schema>,
    tenant: Option<String>,
    namespace: Option<String>,
    resource_id: Option<ResourceId>,
    tenant_resource_id: Option<ResourceId>,
    namespace_resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
struct UpdateSchemasBody {
    schemas: Vec<Schema>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListQuery {
    since_event_id: Option<String>,
    date: Option<NaiveDate>,
    limit: Option<usize>,
    tenant: Option<String>,
    namespace: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /topics
async fn create_topic(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateTopicBody>,
) -> Response {
    let scope = match super::resolve_scope(body.tenant, body.namespace) {
        Ok(scope) => scope,
        Err(err) => return errors::error_response(&err),
    };

    let params = CreateTopic {
        resource_id: body.resource_id.unwrap_or_default(),
        tenant_resource_id: body.tenant_resource_id.unwrap_or_default(),
        namespace_resource_id: body.namespace_resource_id.unwrap_or_default(),
        name: body.name,
        schemas: body.schemas,
    };
    match services.registry.create_topic(params, &scope) {
        Ok(topic) => (StatusCode::CREATED, Json(topic)).into_response(),
        Err(err) => errors::error_response(&err),
    }
}

/// GET /topics
async fn list_topics(Extension(services): Extension<Arc<AppServices>>) -> Response {
    Json(services.registry.get_all_topics()).into_response()
}

/// GET /topics/:name?tenant=&namespace=
async fn get_topic(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> Response {
    let scope = match query.resolve() {
        Ok(scope) => scope,
        Err(err) => return errors::error_response(&err),
    };
    match services.registry.get_topic(&name, &scope) {
        Some(topic) => Json(topic).into_response(),
        None => errors::error_response(&Error::topic_not_found(scope.qualified_name(&name))),
    }
}

/// PUT /topics/:name/schemas, additive schema update.
async fn update_schemas(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
    Query(query): Query<ScopeQuery>,
    Json(body): Json<UpdateSchemasBody>,
) -> Response {
    let scope = match query.resolve() {
        Ok(scope) => scope,
        Err(err) => return errors::error_response(&err),
    };
    match services.registry.update_schemas(&name, body.schemas, &scope) {
        Ok(topic) => Json(topic).into_response(),
        Err(err) => errors::error_response(&err),
    }
}

/// GET /topics/:name/events?sinceEventId=&date=&limit=
async fn list_events(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
    Query(query): Query<EventListQuery>,
) -> Response {
    let scope = match super::resolve_scope(query.tenant, query.namespace) {
        Ok(scope) => scope,
        Err(err) => return errors::error_response(&err),
    };
    if !services.registry.topic_exists(&name, &scope) {
        return errors::error_response(&Error::topic_not_found(scope.qualified_name(&name)));
    }

    let since = match query.since_event_id.as_deref().map(str::parse::<EventId>) {
        None => None,
        Some(Ok(id)) => Some(id),
        Some(Err(err)) => return errors::error_response(&err),
    };
    let mut event_query = EventQuery::all().since_opt(since);
    if let Some(date) = query.date {
        event_query = event_query.on_date(date);
    }
    if let Some(limit) = query.limit {
        event_query = event_query.limit(limit);
    }

    match services.store.get_events(&name, &event_query, &scope) {
        Ok(events) => Json(events).into_response(),
        Err(err) => errors::error_response(&err),
    }
}
