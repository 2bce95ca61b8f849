pub mod artifact_store;
pub mod config;
pub mod error;
pub mod export_writer;
pub mod loader;
pub mod models;
pub mod node_builder;
pub mod pipeline;
pub mod relationship_builder;
pub mod resolver;
pub mod transform;
