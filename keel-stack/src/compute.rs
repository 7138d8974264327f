//! Compute tier - Instance identity, boot script and launch template
//!
//! The boot script is a deferred template: it names database and topic
//! outputs and is only rendered, then base64 encoded, once all of them have
//! been materialized. A launch template is never created from a partially
//! rendered script.

use keel_core::resource::{Resource, Value};

use crate::config::StackConfig;
use crate::database::Database;
use crate::iam;
use crate::security::{DATABASE_PORT, SecurityPolicy};

pub const COMPONENT: &str = "compute";

pub const LAUNCH_TEMPLATE_NAME: &str = "ami_launch_template";

pub const ENV_FILE: &str = "/opt/webapp/.env";

const CLOUDWATCH_AGENT_CTL: &str =
    "/opt/aws/amazon-cloudwatch-agent/bin/amazon-cloudwatch-agent-ctl";
const CLOUDWATCH_AGENT_CONFIG: &str =
    "/opt/aws/amazon-cloudwatch-agent/bin/cloudwatch-config.json";

/// Actions granted on the notification topic
pub const TOPIC_ACTIONS: &[&str] = &[
    "sns:Publish",
    "sns:ListSubscriptionsByTopic",
    "sns:GetTopicAttributes",
    "sns:SetTopicAttributes",
    "sns:DeleteTopic",
    "sns:AddPermission",
    "sns:RemovePermission",
    "sns:Subscribe",
    "sns:Receive",
];

#[derive(Debug, Clone)]
pub struct Compute {
    pub role: Resource,
    pub agent_attachment: Resource,
    pub topic_policy: Resource,
    pub topic_attachment: Resource,
    pub instance_profile: Resource,
    pub launch_template: Resource,
}

impl Compute {
    pub fn launch_template_id(&self) -> Value {
        self.launch_template.output("id")
    }

    pub fn resources(&self) -> Vec<Resource> {
        vec![
            self.role.clone(),
            self.agent_attachment.clone(),
            self.topic_policy.clone(),
            self.topic_attachment.clone(),
            self.instance_profile.clone(),
            self.launch_template.clone(),
        ]
    }
}

/// Boot script writing the application environment and starting the agent
pub fn boot_script(config: &StackConfig, database: &Database, topic: &Resource) -> Value {
    let line = |key: &str, value: Value| -> Vec<Value> {
        vec![
            Value::from(format!("echo '{}=", key)),
            value,
            Value::from(format!("' >> {}\n", ENV_FILE)),
        ]
    };

    let mut parts = vec![Value::from(format!(
        "#!/bin/bash\nsudo touch {env}\nsudo chmod 600 {env}\n",
        env = ENV_FILE
    ))];
    parts.extend(line("DATABASE_USER", database.instance.output("username")));
    parts.extend(line("DATABASE_PASSWORD", database.instance.output("password")));
    parts.extend(line("DATABASE_NAME", database.instance.output("db_name")));
    parts.extend(line("HOST", database.address()));
    parts.extend(line("DATABASE_PORT", Value::Int(DATABASE_PORT)));
    parts.extend(line("PORT", Value::Int(i64::from(config.app_port))));
    parts.extend(line("TOPIC_ARN", topic.output("arn")));
    parts.extend(line("AWS_REGION", Value::from(config.region.as_str())));
    parts.push(Value::from(format!(
        "sudo {} -a fetch-config -m ec2 -c file:{} -s\n",
        CLOUDWATCH_AGENT_CTL, CLOUDWATCH_AGENT_CONFIG
    )));

    Value::Interpolate(parts)
}

pub fn build_compute(
    config: &StackConfig,
    security: &SecurityPolicy,
    database: &Database,
    topic: &Resource,
) -> Compute {
    let role = iam::role("ec2Role", "ec2.amazonaws.com", COMPONENT);
    let agent_attachment = iam::attach(
        "cloudwatch-agent-attachment",
        &role,
        iam::CLOUDWATCH_AGENT_POLICY,
        COMPONENT,
    );

    let topic_policy = Resource::new("aws.iam.policy", "sns-publish-policy")
        .with_attribute("description", "Publish application events")
        .with_attribute("policy", iam::allow_policy(TOPIC_ACTIONS, topic.output("arn")))
        .with_component(COMPONENT);
    let topic_attachment = iam::attach(
        "sns-publish-attachment",
        &role,
        topic_policy.output("arn"),
        COMPONENT,
    );

    let instance_profile = Resource::new("aws.iam.instance_profile", "cloudAgentProfile")
        .with_attribute("role", role.output("name"))
        .with_component(COMPONENT);

    let user_data = Value::Base64(Box::new(boot_script(config, database, topic)));

    let launch_template = Resource::new("aws.ec2.launch_template", LAUNCH_TEMPLATE_NAME)
        .with_attribute("name", LAUNCH_TEMPLATE_NAME)
        .with_attribute("image_id", config.ami.as_str())
        .with_attribute("instance_type", config.instance_type.as_str())
        .with_attribute("key_name", config.key_pair.as_str())
        .with_attribute(
            "vpc_security_group_ids",
            Value::List(vec![security.application_id()]),
        )
        .with_attribute(
            "iam_instance_profile",
            Value::map([("arn", instance_profile.output("arn"))]),
        )
        .with_attribute(
            "block_device_mappings",
            Value::List(vec![Value::map([
                ("device_name", Value::from("/dev/xvda")),
                (
                    "ebs",
                    Value::map([
                        ("volume_size", Value::Int(8)),
                        ("volume_type", Value::from("gp3")),
                        ("delete_on_termination", Value::Bool(true)),
                    ]),
                ),
            ])]),
        )
        .with_attribute("disable_api_termination", false)
        .with_attribute("ebs_optimized", false)
        .with_attribute("user_data", user_data)
        .with_component(COMPONENT);

    log::debug!(
        "Derived launch template {} ({}, {})",
        LAUNCH_TEMPLATE_NAME,
        config.ami,
        config.instance_type
    );

    Compute {
        role,
        agent_attachment,
        topic_policy,
        topic_attachment,
        instance_profile,
        launch_template,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::database::build_database;
    use crate::network::build_network;
    use crate::security::build_security;

    fn derive() -> (Database, Resource, Compute) {
        let config = test_config();
        let network = build_network(&config).unwrap();
        let security = build_security(&config, &network);
        let database = build_database(&config, &network, &security);
        let topic = Resource::new("aws.sns.topic", "my-topic");
        let compute = build_compute(&config, &security, &database, &topic);
        (database, topic, compute)
    }

    fn lookup(resource: &str, attribute: &str) -> Option<Value> {
        let value = match (resource, attribute) {
            ("my-rds-instance", "username") | ("my-rds-instance", "db_name") => {
                Value::from("csye6225")
            }
            ("my-rds-instance", "password") => Value::secret("s3cret-pass"),
            ("my-rds-instance", "address") => Value::from("db.example.internal"),
            ("my-topic", "arn") => Value::from("arn:aws:sns:us-east-1:1:my-topic"),
            _ => return None,
        };
        Some(value)
    }

    #[test]
    fn script_is_deferred_until_inputs_resolve() {
        let (_, _, compute) = derive();
        let user_data = compute.launch_template.get("user_data").unwrap();
        assert!(user_data.is_deferred());

        let deps = compute.launch_template.dependencies();
        assert!(deps.contains("my-rds-instance"));
        assert!(deps.contains("my-topic"));
        assert!(deps.contains("cloudAgentProfile"));
        assert!(deps.contains("app-sg"));
    }

    #[test]
    fn script_renders_every_variable() {
        let config = test_config();
        let (database, topic, _) = derive();
        let rendered = boot_script(&config, &database, &topic)
            .resolve(&lookup)
            .unwrap();

        assert!(rendered.is_sensitive());
        let script = rendered.expose().as_str().unwrap();
        assert!(script.starts_with("#!/bin/bash\n"));
        for line in [
            "echo 'DATABASE_USER=csye6225' >> /opt/webapp/.env",
            "echo 'DATABASE_PASSWORD=s3cret-pass' >> /opt/webapp/.env",
            "echo 'DATABASE_NAME=csye6225' >> /opt/webapp/.env",
            "echo 'HOST=db.example.internal' >> /opt/webapp/.env",
            "echo 'DATABASE_PORT=5432' >> /opt/webapp/.env",
            "echo 'PORT=8080' >> /opt/webapp/.env",
            "echo 'TOPIC_ARN=arn:aws:sns:us-east-1:1:my-topic' >> /opt/webapp/.env",
            "echo 'AWS_REGION=us-east-1' >> /opt/webapp/.env",
        ] {
            assert!(script.contains(line), "missing line: {}", line);
        }
        assert!(script.contains("amazon-cloudwatch-agent-ctl -a fetch-config -m ec2"));
    }

    #[test]
    fn missing_database_output_fails_rendering() {
        let config = test_config();
        let (database, topic, _) = derive();
        let err = boot_script(&config, &database, &topic)
            .resolve(&|r: &str, a: &str| if a == "address" { None } else { lookup(r, a) })
            .unwrap_err();
        assert_eq!(err.resource, "my-rds-instance");
        assert_eq!(err.attribute, "address");
    }

    #[test]
    fn role_has_exactly_two_grants() {
        let (_, _, compute) = derive();
        let attachments: Vec<_> = compute
            .resources()
            .into_iter()
            .filter(|r| r.id.resource_type == "aws.iam.role_policy_attachment")
            .collect();
        assert_eq!(attachments.len(), 2);
        assert_eq!(
            attachments[0].get("policy_arn").and_then(Value::as_str),
            Some(iam::CLOUDWATCH_AGENT_POLICY)
        );
        assert_eq!(
            attachments[1].get("policy_arn"),
            Some(&Value::reference("sns-publish-policy", "arn"))
        );
    }

    #[test]
    fn topic_policy_allows_the_fixed_actions() {
        let (_, _, compute) = derive();
        let policy = compute
            .topic_policy
            .get("policy")
            .unwrap()
            .resolve(&|_: &str, _: &str| Some(Value::from("arn:aws:sns:us-east-1:1:my-topic")))
            .unwrap();
        let doc: serde_json::Value = serde_json::from_str(policy.as_str().unwrap()).unwrap();
        let actions: Vec<_> = doc["Statement"][0]["Action"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a.as_str().unwrap().to_string())
            .collect();
        assert_eq!(actions, TOPIC_ACTIONS);
        assert_eq!(doc["Statement"][0]["Resource"], "arn:aws:sns:us-east-1:1:my-topic");
    }

    #[test]
    fn launch_template_settings() {
        let (_, _, compute) = derive();
        let template = &compute.launch_template;
        assert_eq!(template.name(), "ami_launch_template");
        assert_eq!(
            template.get("instance_type").and_then(Value::as_str),
            Some("t2.micro")
        );
        assert_eq!(
            template.get("key_name").and_then(Value::as_str),
            Some("webapp-key")
        );
        let device = &template.get("block_device_mappings").unwrap().as_list().unwrap()[0];
        let ebs = device.as_map().unwrap()["ebs"].as_map().unwrap();
        assert_eq!(ebs["volume_size"], Value::Int(8));
        assert_eq!(ebs["volume_type"], Value::from("gp3"));
        assert_eq!(ebs["delete_on_termination"], Value::Bool(true));
    }
}
