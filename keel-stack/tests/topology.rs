use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use keel_core::effect::Effect;
use keel_core::interpreter::{ApplyError, EffectOutcome, Interpreter, InterpreterConfig};
use keel_core::plan::Plan;
use keel_core::resource::{ResourceId, State, Value};
use keel_stack::dns::DnsError;
use keel_stack::{
    ConfigSource, Derivation, HostedZone, SimulatedProvider, StackConfig, StackError,
    StaticZones, derive_stack, resolve_outputs,
};

const CONFIG: &str = r#"{
    "region": "us-east-1",
    "name": "csye6225",
    "username": "csye6225",
    "password": "s3cret-pass",
    "appPort": 8080,
    "certificateArn": "arn:aws:acm:us-east-1:123456789012:certificate/abc",
    "ami": "ami-0abcdef1234567890",
    "keyPair": "webapp-key",
    "domain": "demo.example.com",
    "hostedzone": "Z0123456789ABC",
    "project": "webapp-project",
    "tableName": "emails",
    "mailgun_api_key": "key-mailgun"
}"#;

fn config() -> StackConfig {
    let source = ConfigSource::from_json(CONFIG).unwrap();
    StackConfig::from_source(&source).unwrap()
}

async fn derive(config: &StackConfig) -> Derivation {
    derive_stack(config, &StaticZones::from_config(config))
        .await
        .unwrap()
}

fn continue_on_error() -> InterpreterConfig {
    InterpreterConfig {
        continue_on_error: true,
    }
}

fn by_id(states: HashMap<String, State>) -> HashMap<ResourceId, State> {
    states.into_values().map(|s| (s.id.clone(), s)).collect()
}

#[tokio::test]
async fn apply_materializes_every_resource() {
    let config = config();
    let derivation = derive(&config).await;
    assert!(derivation.is_complete());
    derivation.stack.validate().unwrap();

    let plan = derivation.stack.plan().unwrap();
    let interpreter = Interpreter::new(SimulatedProvider::new(&config.region));
    let result = interpreter.apply(&plan).await;

    assert!(result.is_success(), "{:?}", result.failures().collect::<Vec<_>>());
    assert_eq!(result.success_count, derivation.stack.resources().len());

    let outputs = resolve_outputs(derivation.stack.outputs(), &result.states);
    assert_eq!(outputs.len(), 12);
    for (name, value) in &outputs {
        assert!(value.is_ok(), "output {} did not resolve", name);
    }
    assert!(outputs["privateKey"].as_ref().unwrap().is_sensitive());
    assert_eq!(
        outputs["serviceAccountEmail"],
        Ok(Value::from(
            "my-service-account@webapp-project.iam.gserviceaccount.com"
        ))
    );
    let public = outputs["publicSubnetsIds"].as_ref().unwrap();
    assert_eq!(public.as_list().map(<[Value]>::len), Some(3));
}

#[tokio::test]
async fn boot_script_renders_database_and_topic_outputs() {
    let config = config();
    let derivation = derive(&config).await;
    let plan = derivation.stack.plan().unwrap();
    let result = Interpreter::new(SimulatedProvider::new(&config.region))
        .apply(&plan)
        .await;

    let template = result.state("ami_launch_template").unwrap();
    let user_data = template.attribute("user_data").unwrap();
    assert!(user_data.is_sensitive());

    let script = String::from_utf8(STANDARD.decode(user_data.as_str().unwrap()).unwrap()).unwrap();
    let topic_arn = result.state("my-topic").unwrap().attribute("arn").unwrap();
    let address = result
        .state("my-rds-instance")
        .unwrap()
        .attribute("address")
        .unwrap();

    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains("echo 'DATABASE_USER=csye6225' >> /opt/webapp/.env"));
    assert!(script.contains("echo 'DATABASE_PASSWORD=s3cret-pass' >> /opt/webapp/.env"));
    assert!(script.contains("echo 'DATABASE_NAME=csye6225' >> /opt/webapp/.env"));
    assert!(script.contains(&format!("echo 'HOST={}'", address.as_str().unwrap())));
    assert!(script.contains("echo 'DATABASE_PORT=5432'"));
    assert!(script.contains("echo 'PORT=8080'"));
    assert!(script.contains(&format!("echo 'TOPIC_ARN={}'", topic_arn.as_str().unwrap())));
    assert!(script.contains("echo 'AWS_REGION=us-east-1'"));
    assert!(script.contains("amazon-cloudwatch-agent-ctl"));
}

#[tokio::test]
async fn failed_database_blocks_the_launch_template() {
    let config = config();
    let derivation = derive(&config).await;
    let plan = derivation.stack.plan().unwrap();
    let provider = SimulatedProvider::new(&config.region).with_failure("my-rds-instance");
    let result = Interpreter::new(provider)
        .with_config(continue_on_error())
        .apply(&plan)
        .await;

    assert!(!result.is_success());
    let failures: HashMap<String, &ApplyError> = result
        .failures()
        .map(|(id, e)| (id.name.clone(), e))
        .collect();

    assert!(matches!(failures["my-rds-instance"], ApplyError::Provider(_)));
    assert!(matches!(
        failures["ami_launch_template"],
        ApplyError::DependencyFailed { dependency, .. } if dependency == "my-rds-instance"
    ));
    assert!(matches!(
        failures["auto_scaling_group"],
        ApplyError::DependencyFailed { dependency, .. } if dependency == "ami_launch_template"
    ));
    assert!(result.state("ami_launch_template").is_none());

    // Unrelated components still materialize
    assert!(result.state("webapp-lb").is_some());
    assert!(result.state("my-bucket").is_some());
    assert!(result.state("webapp-sns-function").is_some());

    let outputs = resolve_outputs(derivation.stack.outputs(), &result.states);
    assert!(outputs["rdsInstanceId"].is_err());
    assert!(outputs["vpcId"].is_ok());
}

#[tokio::test]
async fn missing_hosted_zone_fails_dns_only() {
    let config = config();
    let zones = StaticZones::new(vec![HostedZone::new("Z9", "other.example.com.")]);
    let derivation = derive_stack(&config, &zones).await.unwrap();

    assert_eq!(derivation.failures.len(), 1);
    assert!(matches!(
        &derivation.failures[0],
        StackError::Dns(DnsError::ZoneNotFound(domain)) if domain == "demo.example.com"
    ));

    let plan = derivation.stack.plan().unwrap();
    let result = Interpreter::new(SimulatedProvider::new(&config.region))
        .apply(&plan)
        .await;
    assert!(result.is_success());
    assert!(result.state("alias").is_none());

    let outputs = resolve_outputs(derivation.stack.outputs(), &result.states);
    assert!(outputs.values().all(Result::is_ok));
}

#[tokio::test]
async fn destroy_runs_in_reverse_dependency_order() {
    let config = config();
    let derivation = derive(&config).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let plan = derivation.stack.plan().unwrap();
    let provider = SimulatedProvider::open(&config.region, &path).unwrap();
    let result = Interpreter::new(provider).apply(&plan).await;
    assert!(result.is_success());

    // A second run sees everything as materialized
    let reopened = SimulatedProvider::open(&config.region, &path).unwrap();
    let states = reopened.states();
    assert_eq!(states.len(), derivation.stack.resources().len());
    let rerun = Interpreter::new(reopened)
        .with_states(states.clone())
        .apply(&plan)
        .await;
    assert!(
        rerun
            .outcomes
            .iter()
            .all(|(_, o)| matches!(o, Ok(EffectOutcome::Skipped { .. })))
    );

    let destroy = Plan::destroy(derivation.stack.resources(), &by_id(states)).unwrap();
    let position = |name: &str| {
        destroy
            .effects()
            .iter()
            .position(|e| matches!(e, Effect::Delete { id, .. } if id.name == name))
            .unwrap()
    };
    assert_eq!(position("custom"), destroy.effects().len() - 1);
    assert!(position("auto_scaling_group") < position("ami_launch_template"));
    assert!(position("ami_launch_template") < position("my-rds-instance"));
    assert!(position("alias") < position("webapp-lb"));

    let provider = SimulatedProvider::open(&config.region, &path).unwrap();
    let result = Interpreter::new(provider).apply(&destroy).await;
    assert!(result.is_success());
    assert!(
        SimulatedProvider::open(&config.region, &path)
            .unwrap()
            .states()
            .is_empty()
    );
}

#[tokio::test]
async fn resumed_apply_does_not_render_redacted_secrets() {
    let config = config();
    let derivation = derive(&config).await;
    let plan = derivation.stack.plan().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let provider = SimulatedProvider::open(&config.region, &path)
        .unwrap()
        .with_failure("my-topic")
        .with_failure("webapp-sns-function");
    let first = Interpreter::new(provider)
        .with_config(continue_on_error())
        .apply(&plan)
        .await;
    assert!(first.state("my-rds-instance").is_some());
    assert!(first.state("account-key").is_some());
    assert!(first.state("ami_launch_template").is_none());

    let reopened = SimulatedProvider::open(&config.region, &path).unwrap();
    let states = reopened.states();
    let second = Interpreter::new(reopened)
        .with_config(continue_on_error())
        .with_states(states)
        .apply(&plan)
        .await;

    assert!(second.state("my-topic").is_some());
    assert!(second.state("ami_launch_template").is_none());
    assert!(second.state("webapp-sns-function").is_none());

    let failures: HashMap<String, &ApplyError> = second
        .failures()
        .map(|(id, e)| (id.name.clone(), e))
        .collect();
    assert!(matches!(
        failures["ami_launch_template"],
        ApplyError::Unresolved { source, .. }
            if source.resource == "my-rds-instance" && source.attribute == "password"
    ));
    assert!(matches!(
        failures["webapp-sns-function"],
        ApplyError::Unresolved { source, .. }
            if source.resource == "account-key" && source.attribute == "private_key"
    ));

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(!content.contains("s3cret-pass"));
}

#[tokio::test]
async fn destroy_removes_resources_the_derivation_no_longer_declares() {
    let config = config();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let derivation = derive(&config).await;
    let provider = SimulatedProvider::open(&config.region, &path).unwrap();
    let result = Interpreter::new(provider)
        .apply(&derivation.stack.plan().unwrap())
        .await;
    assert!(result.state("alias").is_some());

    // The zone lookup fails at destroy time, so the alias is not derived
    let without_dns = derive_stack(&config, &StaticZones::default())
        .await
        .unwrap();
    assert!(without_dns.stack.get("alias").is_none());

    let provider = SimulatedProvider::open(&config.region, &path).unwrap();
    let states = by_id(provider.states());
    let destroy = Plan::destroy(without_dns.stack.resources(), &states).unwrap();
    assert_eq!(destroy.effects()[0].resource_id().name, "alias");
    assert_eq!(destroy.effects().len(), derivation.stack.resources().len());

    let result = Interpreter::new(provider).apply(&destroy).await;
    assert!(result.is_success());
    assert!(
        SimulatedProvider::open(&config.region, &path)
            .unwrap()
            .states()
            .is_empty()
    );
}
