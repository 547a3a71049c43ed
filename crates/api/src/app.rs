//! Service wiring and router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower::buffer::BufferLayer;
use tower::limit::RateLimitLayer;
use tower::{BoxError, ServiceBuilder};

use eventline_events::SchemaValidator;
use eventline_infra::bootstrap::Bootstrap;
use eventline_infra::consumers::{ConsumerRegistry, FileSystemConsumerRegistry};
use eventline_infra::dispatcher::{Dispatcher, DispatcherConfig};
use eventline_infra::event_store::{EventStore, FileSystemEventStore};
use eventline_infra::projections::ProjectionEngine;
use eventline_infra::publisher::EventPublisher;
use eventline_infra::topics::{TopicConfigStore, TopicRegistry};

use crate::config::AppConfig;
use crate::routes;

/// Everything the route handlers need.
pub struct AppServices {
    pub registry: Arc<TopicRegistry>,
    pub store: Arc<dyn EventStore>,
    pub consumers: Arc<dyn ConsumerRegistry>,
    pub publisher: Arc<EventPublisher>,
    pub dispatcher: Arc<Dispatcher>,
    pub projections: Arc<ProjectionEngine>,
}

/// Wire the production stack: filesystem stores, dispatcher, projections,
/// bootstrap. Must run inside a tokio runtime (the dispatcher spawns worker
/// tasks).
pub fn build_services(config: &AppConfig) -> anyhow::Result<Arc<AppServices>> {
    let validator = Arc::new(SchemaValidator::new());
    let registry = Arc::new(TopicRegistry::new(
        TopicConfigStore::new(&config.config_dir),
        Arc::clone(&validator),
    )?);
    let store: Arc<dyn EventStore> = Arc::new(FileSystemEventStore::new(&config.data_dir));
    let consumers: Arc<dyn ConsumerRegistry> =
        Arc::new(FileSystemConsumerRegistry::new(&config.consumers_dir)?);
    let projections = Arc::new(ProjectionEngine::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&consumers),
        Arc::clone(&store),
        DispatcherConfig::default(),
    ));
    let publisher = Arc::new(
        EventPublisher::new(Arc::clone(&registry), Arc::clone(&store), validator)
            .with_dispatcher(Arc::clone(&dispatcher))
            .with_projections(Arc::clone(&projections)),
    );

    Bootstrap::new(Arc::clone(&registry), Arc::clone(&store)).bootstrap(config.admin.clone())?;
    // The replay covers whatever bootstrap just wrote too.
    projections.rebuild(store.as_ref())?;
    dispatcher.start()?;

    Ok(Arc::new(AppServices {
        registry,
        store,
        consumers,
        publisher,
        dispatcher,
        projections,
    }))
}

/// Assemble the router with body-size and rate limits applied.
pub fn build_app(services: Arc<AppServices>, config: &AppConfig) -> Router {
    Router::new()
        .nest("/topics", routes::topics::router())
        .route("/events", post(routes::events::publish))
        .nest("/consumers", routes::consumers::router())
        .route("/health", get(routes::health::health))
        .layer(Extension(services))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|err: BoxError| async move {
                    (StatusCode::TOO_MANY_REQUESTS, format!("rate limited: {err}"))
                }))
                .layer(BufferLayer::new(1024))
                .layer(RateLimitLayer::new(
                    config.rate_limit_per_minute,
                    Duration::from_secs(60),
                )),
        )
}
