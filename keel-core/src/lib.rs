//! Keel Core
//!
//! Resource model, deferred values and the dependency-ordered interpreter
//! used to materialize a desired-state graph through a provider.

pub mod effect;
pub mod graph;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
