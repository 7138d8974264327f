//! Graph - Dependency analysis between resources
//!
//! Edges are never declared by hand: they are derived from the deferred
//! references each resource carries, plus its ordering-only `depends_on`.

use std::collections::{BTreeSet, HashMap};

use crate::resource::Resource;

/// Dependency between resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Target resource name
    pub target: String,
    /// Referenced attribute (e.g., "id"); None for ordering-only edges
    pub attribute: Option<String>,
    /// Where this reference is used (e.g., "vpc_id")
    pub used_in: Option<String>,
}

impl Dependency {
    pub fn reference(
        target: impl Into<String>,
        attribute: impl Into<String>,
        used_in: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            attribute: Some(attribute.into()),
            used_in: Some(used_in.into()),
        }
    }

    pub fn ordering(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            attribute: None,
            used_in: None,
        }
    }
}

/// Errors raised while ordering a graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Resource '{resource}' depends on unknown resource '{target}'")]
    UnknownDependency { resource: String, target: String },

    #[error("Dependency cycle detected involving: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Dependency graph for the resources of a stack
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Resource names in declaration order
    nodes: Vec<String>,
    /// Resource name -> list of dependencies
    pub edges: HashMap<String, Vec<Dependency>>,
    /// Reverse edges: target -> list of resources that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph implied by the references of `resources`
    pub fn from_resources(resources: &[Resource]) -> Self {
        let mut graph = Self::new();
        for resource in resources {
            graph.add_node(resource.name());
        }

        for resource in resources {
            let name = resource.name().to_string();
            let mut keys: Vec<_> = resource.public_attributes().collect();
            keys.sort_by(|a, b| a.0.cmp(b.0));

            for (key, value) in keys {
                for (target, attribute) in value.references() {
                    if target != name {
                        graph.add_edge(
                            name.clone(),
                            Dependency::reference(target, attribute, key.clone()),
                        );
                    }
                }
            }
            for target in &resource.depends_on {
                graph.add_edge(name.clone(), Dependency::ordering(target.clone()));
            }
        }

        graph
    }

    /// Register a resource with no edges yet
    pub fn add_node(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.nodes.contains(&name) {
            self.nodes.push(name);
        }
    }

    /// Add a dependency edge
    pub fn add_edge(&mut self, from: String, dependency: Dependency) {
        let target = dependency.target.clone();
        self.add_node(from.clone());
        self.edges.entry(from.clone()).or_default().push(dependency);
        let dependents = self.reverse_edges.entry(target).or_default();
        if !dependents.contains(&from) {
            dependents.push(from);
        }
    }

    /// Get direct dependencies of a resource
    pub fn dependencies_of(&self, resource: &str) -> &[Dependency] {
        self.edges.get(resource).map_or(&[], |v| v.as_slice())
    }

    /// Distinct names a resource depends on
    pub fn targets_of(&self, resource: &str) -> BTreeSet<&str> {
        self.dependencies_of(resource)
            .iter()
            .map(|d| d.target.as_str())
            .collect()
    }

    /// Get resources that depend on this resource
    pub fn dependents_of(&self, resource: &str) -> &[String] {
        self.reverse_edges
            .get(resource)
            .map_or(&[], |v| v.as_slice())
    }

    /// Check every edge points at a known resource
    pub fn validate(&self) -> Result<(), GraphError> {
        for name in &self.nodes {
            for target in self.targets_of(name) {
                if !self.nodes.iter().any(|n| n == target) {
                    return Err(GraphError::UnknownDependency {
                        resource: name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Creation order: every resource after all of its dependencies
    ///
    /// Ties are broken by declaration order, so the result is stable.
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        self.validate()?;

        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let mut pending: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.targets_of(n).len()))
            .collect();
        let mut ready: BTreeSet<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| pending[n.as_str()] == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_first() {
            let name = &self.nodes[i];
            order.push(name.clone());
            for dependent in self.dependents_of(name) {
                if let Some(count) = pending.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(index[dependent.as_str()]);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = self
                .nodes
                .iter()
                .filter(|n| !order.contains(n))
                .cloned()
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        Ok(order)
    }

    /// Destruction order: the reverse of the creation order
    pub fn destroy_order(&self) -> Result<Vec<String>, GraphError> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }
}
