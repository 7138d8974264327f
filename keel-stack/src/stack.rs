//! Stack - The derived topology as one desired-state graph
//!
//! [`derive_stack`] runs the component builders leaf-first. Each builder
//! only reads deferred outputs of the ones before it, so the graph is
//! complete before anything is materialized. A failed DNS binding is
//! recorded and the rest of the stack is still derived.

use std::collections::{HashMap, HashSet};

use keel_core::graph::{DependencyGraph, GraphError};
use keel_core::plan::Plan;
use keel_core::resource::{Resource, ResourceId};
use keel_core::schema::{ResourceSchema, TypeError};

use crate::compute::build_compute;
use crate::config::{ConfigError, StackConfig};
use crate::database::build_database;
use crate::dns::{DnsError, ZoneLookup, build_dns};
use crate::events::{build_event_glue, build_topic};
use crate::network::{NetworkError, build_network};
use crate::outputs::{Output, exports};
use crate::schemas;
use crate::security::{PolicyError, build_security};
use crate::storage::build_stores;
use crate::traffic::build_traffic;

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Dns(#[from] DnsError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Resource name '{0}' is declared twice")]
    DuplicateName(String),

    #[error("No schema for resource type '{0}'")]
    UnknownType(String),

    #[error("{resource}: {}", join_errors(.errors))]
    Schema {
        resource: ResourceId,
        errors: Vec<TypeError>,
    },
}

fn join_errors(errors: &[TypeError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Resources and exported outputs of one derivation
#[derive(Debug, Clone, Default)]
pub struct Stack {
    resources: Vec<Resource>,
    names: HashSet<String>,
    outputs: Vec<Output>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource; logical names are unique within a stack
    pub fn push(&mut self, resource: Resource) -> Result<(), StackError> {
        if !self.names.insert(resource.id.name.clone()) {
            return Err(StackError::DuplicateName(resource.id.name));
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn extend(&mut self, resources: Vec<Resource>) -> Result<(), StackError> {
        resources.into_iter().try_for_each(|r| self.push(r))
    }

    pub fn with_outputs(mut self, outputs: Vec<Output>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id.name == name)
    }

    pub fn graph(&self) -> DependencyGraph {
        DependencyGraph::from_resources(&self.resources)
    }

    /// Creation plan in dependency order
    pub fn plan(&self) -> Result<Plan, StackError> {
        Ok(Plan::create(&self.resources)?)
    }

    /// Check every resource against its schema, then the graph
    ///
    /// Collects every problem instead of stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<StackError>> {
        self.validate_with(&schemas::schemas_by_type())
    }

    pub fn validate_with(
        &self,
        schemas: &HashMap<String, ResourceSchema>,
    ) -> Result<(), Vec<StackError>> {
        let mut errors = Vec::new();

        for resource in &self.resources {
            match schemas.get(&resource.id.resource_type) {
                Some(schema) => {
                    if let Err(type_errors) = schema.validate(&resource.attributes) {
                        errors.push(StackError::Schema {
                            resource: resource.id.clone(),
                            errors: type_errors,
                        });
                    }
                }
                None => errors.push(StackError::UnknownType(resource.id.resource_type.clone())),
            }
        }

        let graph = self.graph();
        if let Err(e) = graph.validate().and_then(|_| graph.topological_order().map(|_| ())) {
            errors.push(e.into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Desired-state graph as JSON, secrets redacted
    pub fn to_json(&self) -> serde_json::Value {
        let resources: Vec<serde_json::Value> = self
            .resources
            .iter()
            .map(|resource| {
                let attributes: serde_json::Map<String, serde_json::Value> = resource
                    .public_attributes()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::json!({
                    "type": resource.id.resource_type,
                    "name": resource.id.name,
                    "component": resource.component(),
                    "attributes": attributes,
                    "depends_on": resource.dependencies(),
                })
            })
            .collect();

        let outputs: Vec<serde_json::Value> = self
            .outputs
            .iter()
            .map(|output| {
                let value = if output.sensitive {
                    serde_json::Value::String(keel_core::resource::REDACTED.to_string())
                } else {
                    output.value.to_json()
                };
                serde_json::json!({ "name": output.name, "value": value })
            })
            .collect();

        serde_json::json!({ "resources": resources, "outputs": outputs })
    }
}

/// Result of deriving the stack
///
/// `failures` holds component failures that did not stop the derivation
/// (currently only the DNS binding).
#[derive(Debug)]
pub struct Derivation {
    pub stack: Stack,
    pub failures: Vec<StackError>,
}

impl Derivation {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub async fn derive_stack(
    config: &StackConfig,
    zones: &dyn ZoneLookup,
) -> Result<Derivation, StackError> {
    let mut stack = Stack::new();
    let mut failures = Vec::new();

    let network = build_network(config)?;
    stack.extend(network.resources())?;

    let security = build_security(config, &network);
    security.verify_reciprocity()?;
    stack.extend(security.resources())?;

    let database = build_database(config, &network, &security);
    stack.extend(database.resources())?;

    let topic = build_topic();
    stack.push(topic.clone())?;

    let compute = build_compute(config, &security, &database, &topic);
    stack.extend(compute.resources())?;

    let traffic = build_traffic(config, &network, &security, &compute);
    stack.extend(traffic.resources())?;

    match build_dns(config, zones, &traffic).await {
        Ok(record) => stack.push(record)?,
        Err(e) => {
            log::warn!("DNS binding for {} skipped: {}", config.domain, e);
            failures.push(e.into());
        }
    }

    let stores = build_stores(config);
    stack.extend(stores.resources())?;

    let glue = build_event_glue(config, &topic, &stores);
    stack.extend(glue.resources())?;

    let outputs = exports(&network, &security, &database, &stores);
    log::info!(
        "Derived {} resources and {} outputs",
        stack.resources().len(),
        outputs.len()
    );

    Ok(Derivation {
        stack: stack.with_outputs(outputs),
        failures,
    })
}
