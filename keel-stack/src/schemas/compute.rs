//! Database, compute and traffic resource schema definitions

use keel_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as aws_types;

fn string() -> AttributeType {
    AttributeType::String
}

pub fn rds_parameter_group_schema() -> ResourceSchema {
    ResourceSchema::new("aws.rds.parameter_group")
        .attribute(AttributeSchema::new("family", string()).required())
        .attribute(AttributeSchema::new("description", string()))
        .attribute(AttributeSchema::new("parameters", aws_types::object_list()))
}

pub fn rds_subnet_group_schema() -> ResourceSchema {
    ResourceSchema::new("aws.rds.subnet_group")
        .attribute(AttributeSchema::new("subnet_ids", types::string_list()).required())
        .attribute(AttributeSchema::new("tags", aws_types::tags_type()))
}

pub fn rds_instance_schema() -> ResourceSchema {
    ResourceSchema::new("aws.rds.instance")
        .with_description("A managed relational database instance")
        .attribute(
            AttributeSchema::new(
                "engine",
                AttributeType::Enum(vec![
                    "postgres".to_string(),
                    "mysql".to_string(),
                    "mariadb".to_string(),
                ]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("instance_class", string()).required())
        .attribute(
            AttributeSchema::new("allocated_storage", types::positive_int())
                .required()
                .with_description("Storage size in GiB"),
        )
        .attribute(AttributeSchema::new("storage_type", string()))
        .attribute(AttributeSchema::new("db_name", string()).required())
        .attribute(AttributeSchema::new("username", string()).required())
        .attribute(AttributeSchema::new("password", string()).required())
        .attribute(AttributeSchema::new("port", types::port_number()))
        .attribute(AttributeSchema::new("parameter_group_name", string()))
        .attribute(AttributeSchema::new("db_subnet_group_name", string()).required())
        .attribute(AttributeSchema::new("vpc_security_group_ids", types::string_list()))
        .attribute(AttributeSchema::new("publicly_accessible", AttributeType::Bool))
        .attribute(AttributeSchema::new("multi_az", AttributeType::Bool))
        .attribute(AttributeSchema::new("skip_final_snapshot", AttributeType::Bool))
}

pub fn iam_role_schema() -> ResourceSchema {
    ResourceSchema::new("aws.iam.role")
        .attribute(
            AttributeSchema::new("assume_role_policy", string())
                .required()
                .with_description("Trust policy document naming the service that assumes the role"),
        )
}

pub fn iam_policy_schema() -> ResourceSchema {
    ResourceSchema::new("aws.iam.policy")
        .attribute(AttributeSchema::new("description", string()))
        .attribute(AttributeSchema::new("policy", string()).required())
}

pub fn iam_role_policy_attachment_schema() -> ResourceSchema {
    ResourceSchema::new("aws.iam.role_policy_attachment")
        .attribute(AttributeSchema::new("role", string()).required())
        .attribute(AttributeSchema::new("policy_arn", aws_types::arn()).required())
}

pub fn iam_instance_profile_schema() -> ResourceSchema {
    ResourceSchema::new("aws.iam.instance_profile")
        .attribute(AttributeSchema::new("role", string()).required())
}

pub fn launch_template_schema() -> ResourceSchema {
    ResourceSchema::new("aws.ec2.launch_template")
        .with_description("Launch template for the application instances")
        .attribute(AttributeSchema::new("name", string()).required())
        .attribute(AttributeSchema::new("image_id", aws_types::ami_id()).required())
        .attribute(AttributeSchema::new("instance_type", string()).required())
        .attribute(AttributeSchema::new("key_name", string()))
        .attribute(AttributeSchema::new("vpc_security_group_ids", types::string_list()))
        .attribute(AttributeSchema::new("iam_instance_profile", aws_types::object()))
        .attribute(AttributeSchema::new("block_device_mappings", aws_types::object_list()))
        .attribute(AttributeSchema::new("disable_api_termination", AttributeType::Bool))
        .attribute(AttributeSchema::new("ebs_optimized", AttributeType::Bool))
        .attribute(
            AttributeSchema::new("user_data", string())
                .required()
                .with_description("Base64-encoded boot script"),
        )
}

pub fn target_group_schema() -> ResourceSchema {
    ResourceSchema::new("aws.lb.target_group")
        .attribute(AttributeSchema::new("port", types::port_number()).required())
        .attribute(
            AttributeSchema::new(
                "protocol",
                AttributeType::Enum(vec!["HTTP".to_string(), "HTTPS".to_string()]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("vpc_id", string()).required())
        .attribute(AttributeSchema::new("target_type", string()))
        .attribute(AttributeSchema::new("slow_start", AttributeType::Int))
        .attribute(AttributeSchema::new("health_check", aws_types::object()))
}

pub fn load_balancer_schema() -> ResourceSchema {
    ResourceSchema::new("aws.lb.load_balancer")
        .with_description("An internet-facing application load balancer")
        .attribute(
            AttributeSchema::new(
                "load_balancer_type",
                AttributeType::Enum(vec!["application".to_string(), "network".to_string()]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("internal", AttributeType::Bool))
        .attribute(AttributeSchema::new("subnets", types::string_list()).required())
        .attribute(AttributeSchema::new("security_groups", types::string_list()))
}

pub fn listener_schema() -> ResourceSchema {
    ResourceSchema::new("aws.lb.listener")
        .attribute(AttributeSchema::new("load_balancer_arn", string()).required())
        .attribute(AttributeSchema::new("port", types::port_number()).required())
        .attribute(AttributeSchema::new("protocol", string()).required())
        .attribute(
            AttributeSchema::new("certificate_arn", aws_types::arn())
                .with_description("TLS certificate presented by an HTTPS listener"),
        )
        .attribute(AttributeSchema::new("default_actions", aws_types::object_list()).required())
}

pub fn autoscaling_group_schema() -> ResourceSchema {
    ResourceSchema::new("aws.autoscaling.group")
        .with_description("Auto scaling group running the launch template")
        .attribute(AttributeSchema::new("name", string()).required())
        .attribute(AttributeSchema::new("min_size", AttributeType::Int).required())
        .attribute(AttributeSchema::new("max_size", types::positive_int()).required())
        .attribute(AttributeSchema::new("desired_capacity", AttributeType::Int))
        .attribute(AttributeSchema::new("default_cooldown", AttributeType::Int))
        .attribute(AttributeSchema::new("default_instance_warmup", AttributeType::Int))
        .attribute(
            AttributeSchema::new(
                "health_check_type",
                AttributeType::Enum(vec!["EC2".to_string(), "ELB".to_string()]),
            ),
        )
        .attribute(AttributeSchema::new("launch_template", aws_types::object()).required())
        .attribute(AttributeSchema::new("target_group_arns", types::string_list()))
        .attribute(AttributeSchema::new("vpc_zone_identifiers", types::string_list()).required())
        .attribute(AttributeSchema::new("tags", aws_types::object_list()))
}

pub fn autoscaling_policy_schema() -> ResourceSchema {
    ResourceSchema::new("aws.autoscaling.policy")
        .attribute(AttributeSchema::new("autoscaling_group_name", string()).required())
        .attribute(AttributeSchema::new("adjustment_type", string()).required())
        .attribute(AttributeSchema::new("scaling_adjustment", AttributeType::Int).required())
        .attribute(AttributeSchema::new("cooldown", AttributeType::Int))
}

pub fn metric_alarm_schema() -> ResourceSchema {
    ResourceSchema::new("aws.cloudwatch.metric_alarm")
        .attribute(
            AttributeSchema::new(
                "comparison_operator",
                AttributeType::Enum(vec![
                    "GreaterThanThreshold".to_string(),
                    "GreaterThanOrEqualToThreshold".to_string(),
                    "LessThanThreshold".to_string(),
                    "LessThanOrEqualToThreshold".to_string(),
                ]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("threshold", AttributeType::Int).required())
        .attribute(AttributeSchema::new("evaluation_periods", types::positive_int()).required())
        .attribute(AttributeSchema::new("period", types::positive_int()))
        .attribute(AttributeSchema::new("metric_name", string()).required())
        .attribute(AttributeSchema::new("namespace", string()).required())
        .attribute(AttributeSchema::new("statistic", string()))
        .attribute(AttributeSchema::new("alarm_description", string()))
        .attribute(AttributeSchema::new("dimensions", AttributeType::Map(Box::new(string()))))
        .attribute(AttributeSchema::new("alarm_actions", types::string_list()))
}

pub fn route53_record_schema() -> ResourceSchema {
    ResourceSchema::new("aws.route53.record")
        .with_description("A DNS record in a hosted zone")
        .attribute(AttributeSchema::new("zone_id", string()).required())
        .attribute(AttributeSchema::new("name", aws_types::domain_name()).required())
        .attribute(
            AttributeSchema::new(
                "type",
                AttributeType::Enum(vec![
                    "A".to_string(),
                    "AAAA".to_string(),
                    "CNAME".to_string(),
                ]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("aliases", aws_types::object_list()))
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        rds_parameter_group_schema(),
        rds_subnet_group_schema(),
        rds_instance_schema(),
        iam_role_schema(),
        iam_policy_schema(),
        iam_role_policy_attachment_schema(),
        iam_instance_profile_schema(),
        launch_template_schema(),
        target_group_schema(),
        load_balancer_schema(),
        listener_schema(),
        autoscaling_group_schema(),
        autoscaling_policy_schema(),
        metric_alarm_schema(),
        route53_record_schema(),
    ]
}
