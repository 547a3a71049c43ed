//! Topic lifecycle: registry, sequence allocation, config persistence.

pub mod config;
pub mod registry;

pub use config::TopicConfigStore;
pub use registry::{CreateTopic, TopicRegistry};
