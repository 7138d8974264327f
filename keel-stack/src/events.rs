//! Event glue - Notification topic delivering to a serverless function
//!
//! The topic is derived early because the boot script publishes to it; the
//! rest of the glue comes last, once the stores it configures exist.

use keel_core::resource::{Resource, Value};

use crate::config::StackConfig;
use crate::iam;
use crate::storage::Stores;

pub const COMPONENT: &str = "events";

pub const FUNCTION_NAME: &str = "webapp-sns-function";
pub const FUNCTION_RUNTIME: &str = "nodejs16.x";
pub const FUNCTION_HANDLER: &str = "index.handler";
pub const FUNCTION_TIMEOUT_SECONDS: i64 = 600;

pub const TOPIC_PRINCIPAL: &str = "sns.amazonaws.com";

#[derive(Debug, Clone)]
pub struct EventGlue {
    pub role: Resource,
    pub basic_execution: Resource,
    pub table_access: Resource,
    pub function: Resource,
    pub subscription: Resource,
    pub permission: Resource,
}

impl EventGlue {
    pub fn resources(&self) -> Vec<Resource> {
        vec![
            self.role.clone(),
            self.basic_execution.clone(),
            self.table_access.clone(),
            self.function.clone(),
            self.subscription.clone(),
            self.permission.clone(),
        ]
    }
}

pub fn build_topic() -> Resource {
    Resource::new("aws.sns.topic", "my-topic")
        .with_attribute("display_name", "My SNS Topic")
        .with_component(COMPONENT)
}

pub fn build_event_glue(config: &StackConfig, topic: &Resource, stores: &Stores) -> EventGlue {
    let role = iam::role("lambdaRole", "lambda.amazonaws.com", COMPONENT);
    let basic_execution = iam::attach(
        "lambda-basic-execution",
        &role,
        iam::LAMBDA_BASIC_EXECUTION_POLICY,
        COMPONENT,
    );
    let table_access = iam::attach(
        "lambda-table-access",
        &role,
        iam::DYNAMODB_FULL_ACCESS_POLICY,
        COMPONENT,
    );

    let function = Resource::new("aws.lambda.function", FUNCTION_NAME)
        .with_attribute("function_name", FUNCTION_NAME)
        .with_attribute("role", role.output("arn"))
        .with_attribute("runtime", FUNCTION_RUNTIME)
        .with_attribute("handler", FUNCTION_HANDLER)
        .with_attribute("filename", config.function_archive.as_str())
        .with_attribute("timeout", FUNCTION_TIMEOUT_SECONDS)
        .with_attribute(
            "environment",
            Value::map([(
                "variables",
                Value::map([
                    ("GCP_SECRET_KEY", stores.private_key()),
                    ("BUCKET_NAME", stores.bucket_name()),
                    ("MAILGUN_API_KEY", config.mailgun_api_key.to_value()),
                    ("TABLE_NAME", stores.table_name()),
                ]),
            )]),
        )
        // Both grants must exist before the function can run
        .with_dependency(basic_execution.name())
        .with_dependency(table_access.name())
        .with_component(COMPONENT);

    let subscription = Resource::new("aws.sns.topic_subscription", "lambda-subscription")
        .with_attribute("topic", topic.output("arn"))
        .with_attribute("protocol", "lambda")
        .with_attribute("endpoint", function.output("arn"))
        .with_component(COMPONENT);

    let permission = Resource::new("aws.lambda.permission", "sns-invoke-permission")
        .with_attribute("action", "lambda:InvokeFunction")
        .with_attribute("function", function.output("function_name"))
        .with_attribute("principal", TOPIC_PRINCIPAL)
        .with_attribute("source_arn", topic.output("arn"))
        .with_component(COMPONENT);

    log::debug!(
        "Derived function {} subscribed to {}",
        FUNCTION_NAME,
        topic.name()
    );

    EventGlue {
        role,
        basic_execution,
        table_access,
        function,
        subscription,
        permission,
    }
}
