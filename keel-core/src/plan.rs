//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed.
//! No side effects occur until the Plan is applied.

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::graph::{DependencyGraph, GraphError};
use crate::resource::{Resource, ResourceId, State};

/// Group name for effects that carry no component tag
pub const UNGROUPED: &str = "root";

/// Plan containing Effects to be executed
#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation plan: every resource after the resources it references
    pub fn create(resources: &[Resource]) -> Result<Self, GraphError> {
        let graph = DependencyGraph::from_resources(resources);
        let by_name: HashMap<&str, &Resource> =
            resources.iter().map(|r| (r.name(), r)).collect();

        let mut plan = Plan::new();
        for name in graph.topological_order()? {
            if let Some(resource) = by_name.get(name.as_str()) {
                plan.add(Effect::Create((*resource).clone()));
            }
        }
        Ok(plan)
    }

    /// Destruction plan covering every materialized resource
    ///
    /// Materialized resources the stack no longer declares go first (by
    /// id); the rest follow in reverse dependency order.
    pub fn destroy(
        resources: &[Resource],
        states: &HashMap<ResourceId, State>,
    ) -> Result<Self, GraphError> {
        let graph = DependencyGraph::from_resources(resources);
        let by_name: HashMap<&str, &Resource> =
            resources.iter().map(|r| (r.name(), r)).collect();
        let declared: HashSet<&ResourceId> = resources.iter().map(|r| &r.id).collect();

        let mut plan = Plan::new();
        let mut orphans: Vec<&State> = states
            .values()
            .filter(|state| state.exists && !declared.contains(&state.id))
            .collect();
        orphans.sort_by(|a, b| a.id.cmp(&b.id));
        for state in orphans {
            log::info!("{} is materialized but no longer declared", state.id);
            plan.add_delete(state);
        }

        for name in graph.destroy_order()? {
            if let Some(resource) = by_name.get(name.as_str())
                && let Some(state) = states.get(&resource.id)
            {
                plan.add_delete(state);
            }
        }
        Ok(plan)
    }

    fn add_delete(&mut self, state: &State) {
        if state.exists
            && let Some(identifier) = &state.identifier
        {
            self.add(Effect::Delete {
                id: state.id.clone(),
                identifier: identifier.clone(),
            });
        }
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Create(_) => summary.create += 1,
                Effect::Delete { .. } => summary.delete += 1,
            }
        }
        summary
    }

    /// Effect indices grouped by the component that derived them
    ///
    /// Groups are listed in the order their first effect appears.
    pub fn component_groups(&self) -> Vec<(String, Vec<usize>)> {
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (idx, effect) in self.effects.iter().enumerate() {
            let component = match effect {
                Effect::Create(r) => r.component().unwrap_or(UNGROUPED),
                Effect::Delete { .. } => UNGROUPED,
            };
            match groups.iter_mut().find(|(name, _)| name.as_str() == component) {
                Some((_, indices)) => indices.push(idx),
                None => groups.push((component.to_string(), vec![idx])),
            }
        }
        groups
    }
}

#[derive(Debug, Default)]
pub struct PlanSummary {
    pub create: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to delete",
            self.create, self.delete
        )
    }
}
