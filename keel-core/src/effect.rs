//! Effect - A single side effect against a provider
//!
//! Effects are plain values; nothing happens until an interpreter runs them.

use std::fmt;

use crate::resource::{Resource, ResourceId};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Materialize a resource (its deferred values are resolved first)
    Create(Resource),
    /// Remove a materialized resource by its provider identifier
    Delete { id: ResourceId, identifier: String },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(resource) => &resource.id,
            Effect::Delete { id, .. } => id,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Create(r) => write!(f, "Create {}", r.id),
            Effect::Delete { id, .. } => write!(f, "Delete {}", id),
        }
    }
}
