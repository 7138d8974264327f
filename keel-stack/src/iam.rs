//! IAM helpers shared by the compute and event tiers

use keel_core::resource::{Resource, Value};

pub const POLICY_VERSION: &str = "2012-10-17";

pub const CLOUDWATCH_AGENT_POLICY: &str = "arn:aws:iam::aws:policy/CloudWatchAgentServerPolicy";
pub const LAMBDA_BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";
pub const DYNAMODB_FULL_ACCESS_POLICY: &str = "arn:aws:iam::aws:policy/AmazonDynamoDBFullAccess";

/// Trust policy letting `service` assume a role
pub fn assume_role_policy(service: &str) -> Value {
    Value::Json(Box::new(Value::map([
        ("Version", Value::from(POLICY_VERSION)),
        (
            "Statement",
            Value::List(vec![Value::map([
                ("Effect", Value::from("Allow")),
                ("Action", Value::from("sts:AssumeRole")),
                ("Principal", Value::map([("Service", Value::from(service))])),
            ])]),
        ),
    ])))
}

/// Permission policy document allowing `actions` on `resource`
pub fn allow_policy(actions: &[&str], resource: Value) -> Value {
    Value::Json(Box::new(Value::map([
        ("Version", Value::from(POLICY_VERSION)),
        (
            "Statement",
            Value::List(vec![Value::map([
                ("Effect", Value::from("Allow")),
                ("Action", Value::string_list(actions.iter().copied())),
                ("Resource", resource),
            ])]),
        ),
    ])))
}

pub fn role(name: &str, service: &str, component: &str) -> Resource {
    Resource::new("aws.iam.role", name)
        .with_attribute("assume_role_policy", assume_role_policy(service))
        .with_component(component)
}

/// Attach a policy (managed ARN or deferred custom policy ARN) to a role
pub fn attach(
    name: &str,
    role: &Resource,
    policy_arn: impl Into<Value>,
    component: &str,
) -> Resource {
    Resource::new("aws.iam.role_policy_attachment", name)
        .with_attribute("role", role.output("name"))
        .with_attribute("policy_arn", policy_arn)
        .with_component(component)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_policy_names_the_service() {
        let policy = assume_role_policy("ec2.amazonaws.com")
            .resolve(&|_: &str, _: &str| None)
            .unwrap();
        let doc: serde_json::Value = serde_json::from_str(policy.as_str().unwrap()).unwrap();
        assert_eq!(doc["Statement"][0]["Principal"]["Service"], "ec2.amazonaws.com");
        assert_eq!(doc["Statement"][0]["Action"], "sts:AssumeRole");
    }

    #[test]
    fn attachment_references_the_role() {
        let role = role("ec2Role", "ec2.amazonaws.com", "compute");
        let attachment = attach("agent", &role, CLOUDWATCH_AGENT_POLICY, "compute");
        assert_eq!(attachment.dependencies().into_iter().collect::<Vec<_>>(), vec!["ec2Role"]);
        assert_eq!(
            attachment.get("policy_arn").and_then(Value::as_str),
            Some(CLOUDWATCH_AGENT_POLICY)
        );
    }
}
