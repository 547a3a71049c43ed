//! Event model: identity, topics, schemas, consumers, system event payloads.

pub mod consumer;
pub mod event;
pub mod schema;
pub mod system;
pub mod topic;

pub use consumer::Consumer;
pub use event::{Event, EventId};
pub use schema::SchemaValidator;
pub use topic::{Schema, Topic};
