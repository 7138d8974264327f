//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes the Effects of a Plan in order. Before a
//! resource is handed to the provider every deferred value it carries is
//! resolved against the states materialized so far; a resource whose inputs
//! are missing is never submitted.

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError};
use crate::resource::{Resource, ResourceId, State, UnresolvedRef, Value};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Create succeeded
    Created { state: State },
    /// Delete succeeded
    Deleted,
    /// Skipped (already materialized)
    Skipped { reason: String },
}

/// Why a single Effect failed
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{resource} was not created: dependency '{dependency}' is not available")]
    DependencyFailed {
        resource: ResourceId,
        dependency: String,
    },

    #[error("{resource} was not created: {source}")]
    Unresolved {
        resource: ResourceId,
        #[source]
        source: UnresolvedRef,
    },
}

/// Result of executing the entire Plan
#[derive(Debug, Default)]
pub struct ApplyResult {
    pub outcomes: Vec<(ResourceId, Result<EffectOutcome, ApplyError>)>,
    pub success_count: usize,
    pub failure_count: usize,
    /// Materialized states by resource name, after the run
    pub states: HashMap<String, State>,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name).filter(|s| s.exists)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ResourceId, &ApplyError)> {
        self.outcomes
            .iter()
            .filter_map(|(id, result)| result.as_ref().err().map(|e| (id, e)))
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// Continue on error; dependents of a failed resource still fail
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
    known: HashMap<String, State>,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
            known: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed states from an earlier run; those resources are not created again
    pub fn with_states(mut self, states: HashMap<String, State>) -> Self {
        self.known = states;
        self
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let mut result = ApplyResult {
            states: self.known.clone(),
            ..Default::default()
        };

        for effect in plan.effects() {
            let id = effect.resource_id().clone();
            let outcome = self.execute_effect(effect, &mut result.states).await;

            match &outcome {
                Ok(_) => result.success_count += 1,
                Err(e) => {
                    log::warn!("{}", e);
                    result.failure_count += 1;
                }
            }

            let stop = outcome.is_err() && !self.config.continue_on_error;
            result.outcomes.push((id, outcome));
            if stop {
                break;
            }
        }

        result
    }

    /// Execute a single Effect
    async fn execute_effect(
        &self,
        effect: &Effect,
        states: &mut HashMap<String, State>,
    ) -> Result<EffectOutcome, ApplyError> {
        match effect {
            Effect::Create(resource) => {
                if states.get(resource.name()).is_some_and(|s| s.exists) {
                    return Ok(EffectOutcome::Skipped {
                        reason: "already exists".to_string(),
                    });
                }

                let resolved = resolve_resource(resource, states)?;
                let state = self
                    .provider
                    .create(&resolved)
                    .await
                    .map_err(|e| match e.resource_id {
                        Some(_) => e,
                        None => e.for_resource(resource.id.clone()),
                    })?;
                log::info!(
                    "Created {} ({})",
                    resource.id,
                    state.identifier.as_deref().unwrap_or("-")
                );
                states.insert(resource.name().to_string(), state.clone());
                Ok(EffectOutcome::Created { state })
            }
            Effect::Delete { id, identifier } => {
                self.provider.delete(id, identifier).await?;
                log::info!("Deleted {} ({})", id, identifier);
                states.remove(&id.name);
                Ok(EffectOutcome::Deleted)
            }
        }
    }
}

/// Replace every deferred value of `resource` with its materialized value
pub fn resolve_resource(
    resource: &Resource,
    states: &HashMap<String, State>,
) -> Result<Resource, ApplyError> {
    for dependency in resource.dependencies() {
        if !states.get(&dependency).is_some_and(|s| s.exists) {
            return Err(ApplyError::DependencyFailed {
                resource: resource.id.clone(),
                dependency,
            });
        }
    }

    let lookup = |name: &str, attribute: &str| -> Option<Value> {
        states
            .get(name)
            .filter(|s| s.exists)
            .and_then(|s| s.attribute(attribute))
    };

    let mut resolved = resource.clone();
    for (key, value) in &resource.attributes {
        let value = value
            .resolve(&lookup)
            .map_err(|source| ApplyError::Unresolved {
                resource: resource.id.clone(),
                source,
            })?;
        resolved.attributes.insert(key.clone(), value);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{BoxFuture, ProviderResult};

    /// Echoes attributes back; fails for names listed in `failing`
    struct TestProvider {
        failing: Vec<&'static str>,
    }

    impl TestProvider {
        fn new() -> Self {
            Self { failing: vec![] }
        }
    }

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn read(
            &self,
            id: &ResourceId,
            _identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let result = if self.failing.contains(&resource.name()) {
                Err(ProviderError::new("quota exceeded"))
            } else {
                let mut attributes = resource.attributes.clone();
                attributes.insert(
                    "address".to_string(),
                    Value::String(format!("{}.internal", resource.name())),
                );
                Ok(State::existing(resource.id.clone(), attributes)
                    .with_identifier(format!("test-{}", resource.name())))
            };
            Box::pin(async move { result })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn stack() -> Vec<Resource> {
        vec![
            Resource::new("aws.rds.instance", "db"),
            Resource::new("aws.sns.topic", "topic"),
            Resource::new("aws.ec2.launch_template", "template").with_attribute(
                "user_data",
                Value::Base64(Box::new(Value::Interpolate(vec![
                    Value::from("HOST="),
                    Value::reference("db", "address"),
                ]))),
            ),
        ]
    }

    #[tokio::test]
    async fn apply_empty_plan() {
        let interpreter = Interpreter::new(TestProvider::new());
        let plan = Plan::new();
        let result = interpreter.apply(&plan).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 0);
    }

    #[tokio::test]
    async fn apply_resolves_references() {
        let interpreter = Interpreter::new(TestProvider::new());
        let plan = Plan::create(&stack()).unwrap();

        let result = interpreter.apply(&plan).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 3);
        let template = result.state("template").unwrap();
        let user_data = template.attributes["user_data"].as_str().unwrap();
        assert!(!user_data.contains("db.address"));
        assert_eq!(user_data, "SE9TVD1kYi5pbnRlcm5hbA==");
    }

    #[tokio::test]
    async fn failed_dependency_blocks_dependents() {
        let provider = TestProvider {
            failing: vec!["db"],
        };
        let config = InterpreterConfig {
            continue_on_error: true,
        };
        let interpreter = Interpreter::new(provider).with_config(config);
        let plan = Plan::create(&stack()).unwrap();

        let result = interpreter.apply(&plan).await;

        assert_eq!(result.failure_count, 2);
        assert!(result.state("topic").is_some());
        assert!(result.state("template").is_none());
        let failures: Vec<_> = result.failures().collect();
        assert!(matches!(failures[0].1, ApplyError::Provider(_)));
        assert!(matches!(
            failures[1].1,
            ApplyError::DependencyFailed { dependency, .. } if dependency == "db"
        ));
    }

    #[tokio::test]
    async fn stops_at_first_failure_by_default() {
        let provider = TestProvider {
            failing: vec!["db"],
        };
        let interpreter = Interpreter::new(provider);
        let plan = Plan::create(&stack()).unwrap();

        let result = interpreter.apply(&plan).await;

        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.failure_count, 1);
    }

    #[test]
    fn missing_attribute_is_unresolved() {
        let mut states = HashMap::new();
        states.insert(
            "db".to_string(),
            State::existing(ResourceId::new("aws.rds.instance", "db"), HashMap::new())
                .with_identifier("db-1"),
        );
        let resource = Resource::new("aws.ec2.launch_template", "template")
            .with_attribute("host", Value::reference("db", "address"));

        let err = resolve_resource(&resource, &states).unwrap_err();
        assert_eq!(
            err.to_string(),
            "aws.ec2.launch_template.template was not created: unresolved reference db.address"
        );
    }

    #[tokio::test]
    async fn seeded_states_are_not_recreated() {
        let mut seeded = HashMap::new();
        seeded.insert(
            "db".to_string(),
            State::existing(ResourceId::new("aws.rds.instance", "db"), HashMap::new())
                .with_identifier("db-1"),
        );
        let interpreter = Interpreter::new(TestProvider::new()).with_states(seeded);
        let plan = Plan::create(&stack()[..1]).unwrap();

        let result = interpreter.apply(&plan).await;

        assert!(matches!(
            result.outcomes[0].1,
            Ok(EffectOutcome::Skipped { .. })
        ));
        assert_eq!(result.state("db").unwrap().identifier.as_deref(), Some("db-1"));
    }

}
