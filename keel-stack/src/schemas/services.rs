//! Key-value table, notification glue and second-cloud schema definitions

use keel_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as aws_types;

pub fn dynamodb_table_schema() -> ResourceSchema {
    ResourceSchema::new("aws.dynamodb.table")
        .with_description("A key-value table")
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("attributes", aws_types::object_list())
                .required()
                .with_description("Key attribute definitions: name and type (S, N or B)"),
        )
        .attribute(AttributeSchema::new("hash_key", AttributeType::String).required())
        .attribute(AttributeSchema::new(
            "billing_mode",
            AttributeType::Enum(vec!["PAY_PER_REQUEST".to_string(), "PROVISIONED".to_string()]),
        ))
        .attribute(AttributeSchema::new("tags", aws_types::tags_type()))
}

pub fn sns_topic_schema() -> ResourceSchema {
    ResourceSchema::new("aws.sns.topic")
        .attribute(AttributeSchema::new("display_name", AttributeType::String))
}

pub fn sns_topic_subscription_schema() -> ResourceSchema {
    ResourceSchema::new("aws.sns.topic_subscription")
        .attribute(AttributeSchema::new("topic", AttributeType::String).required())
        .attribute(
            AttributeSchema::new(
                "protocol",
                AttributeType::Enum(vec![
                    "lambda".to_string(),
                    "sqs".to_string(),
                    "https".to_string(),
                    "email".to_string(),
                ]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("endpoint", AttributeType::String).required())
}

pub fn lambda_function_schema() -> ResourceSchema {
    ResourceSchema::new("aws.lambda.function")
        .with_description("A serverless function triggered by the notification topic")
        .attribute(AttributeSchema::new("function_name", AttributeType::String).required())
        .attribute(AttributeSchema::new("role", AttributeType::String).required())
        .attribute(AttributeSchema::new("runtime", AttributeType::String).required())
        .attribute(AttributeSchema::new("handler", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("filename", AttributeType::String)
                .required()
                .with_description("Path to the deployment archive"),
        )
        .attribute(AttributeSchema::new("timeout", types::positive_int()))
        .attribute(AttributeSchema::new("environment", aws_types::object()))
}

pub fn lambda_permission_schema() -> ResourceSchema {
    ResourceSchema::new("aws.lambda.permission")
        .attribute(AttributeSchema::new("action", AttributeType::String).required())
        .attribute(AttributeSchema::new("function", AttributeType::String).required())
        .attribute(AttributeSchema::new("principal", AttributeType::String).required())
        .attribute(AttributeSchema::new("source_arn", AttributeType::String))
}

pub fn gcp_bucket_schema() -> ResourceSchema {
    ResourceSchema::new("gcp.storage.bucket")
        .with_description("An object storage bucket; the provider picks its name")
        .attribute(AttributeSchema::new("project", AttributeType::String).required())
        .attribute(AttributeSchema::new("location", AttributeType::String).required())
        .attribute(AttributeSchema::new("force_destroy", AttributeType::Bool))
}

pub fn gcp_service_account_schema() -> ResourceSchema {
    ResourceSchema::new("gcp.service_account")
        .attribute(AttributeSchema::new("account_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("display_name", AttributeType::String))
        .attribute(AttributeSchema::new("project", AttributeType::String).required())
}

pub fn gcp_service_account_key_schema() -> ResourceSchema {
    ResourceSchema::new("gcp.service_account_key")
        .attribute(AttributeSchema::new("service_account_id", AttributeType::String).required())
}

pub fn gcp_custom_role_schema() -> ResourceSchema {
    ResourceSchema::new("gcp.iam.custom_role")
        .attribute(AttributeSchema::new("role_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("title", AttributeType::String).required())
        .attribute(AttributeSchema::new("permissions", types::string_list()).required())
        .attribute(AttributeSchema::new("project", AttributeType::String).required())
}

pub fn gcp_iam_member_schema() -> ResourceSchema {
    ResourceSchema::new("gcp.iam.member")
        .with_description("Grants one role to one member of a project")
        .attribute(AttributeSchema::new("project", AttributeType::String).required())
        .attribute(AttributeSchema::new("role", AttributeType::String).required())
        .attribute(AttributeSchema::new("member", AttributeType::String).required())
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        dynamodb_table_schema(),
        sns_topic_schema(),
        sns_topic_subscription_schema(),
        lambda_function_schema(),
        lambda_permission_schema(),
        gcp_bucket_schema(),
        gcp_service_account_schema(),
        gcp_service_account_key_schema(),
        gcp_custom_role_schema(),
        gcp_iam_member_schema(),
    ]
}
