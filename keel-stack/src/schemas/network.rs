//! Network resource schema definitions

use keel_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as aws_types;

pub fn vpc_schema() -> ResourceSchema {
    ResourceSchema::new("aws.vpc")
        .with_description("An AWS VPC (Virtual Private Cloud)")
        .attribute(
            AttributeSchema::new("cidr_block", types::cidr())
                .required()
                .with_description("The IPv4 network range for the VPC, in CIDR notation"),
        )
        .attribute(AttributeSchema::new("enable_dns_support", AttributeType::Bool))
        .attribute(AttributeSchema::new("enable_dns_hostnames", AttributeType::Bool))
        .attribute(AttributeSchema::new("tags", aws_types::tags_type()))
}

pub fn subnet_schema() -> ResourceSchema {
    ResourceSchema::new("aws.subnet")
        .with_description("A subnet in a VPC, bound to one availability zone")
        .attribute(AttributeSchema::new("vpc_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("cidr_block", types::cidr()).required())
        .attribute(
            AttributeSchema::new("availability_zone", aws_types::availability_zone()).required(),
        )
        .attribute(
            AttributeSchema::new("map_public_ip_on_launch", AttributeType::Bool)
                .required()
                .with_description("Whether instances get a public IPv4 address"),
        )
        .attribute(AttributeSchema::new("tags", aws_types::tags_type()))
}

pub fn internet_gateway_schema() -> ResourceSchema {
    ResourceSchema::new("aws.internet_gateway")
        .with_description("An internet gateway attached to a VPC")
        .attribute(AttributeSchema::new("vpc_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("tags", aws_types::tags_type()))
}

pub fn route_table_schema() -> ResourceSchema {
    ResourceSchema::new("aws.route_table")
        .attribute(AttributeSchema::new("vpc_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("tags", aws_types::tags_type()))
}

pub fn route_schema() -> ResourceSchema {
    ResourceSchema::new("aws.route")
        .with_description("A route in a route table")
        .attribute(AttributeSchema::new("route_table_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("destination_cidr_block", types::cidr()).required())
        .attribute(AttributeSchema::new("gateway_id", AttributeType::String).required())
}

pub fn route_table_association_schema() -> ResourceSchema {
    ResourceSchema::new("aws.route_table_association")
        .attribute(AttributeSchema::new("subnet_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("route_table_id", AttributeType::String).required())
}

pub fn security_group_schema() -> ResourceSchema {
    ResourceSchema::new("aws.security_group")
        .with_description("A security group with inline CIDR rules")
        .attribute(AttributeSchema::new("vpc_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(
            AttributeSchema::new("ingress", aws_types::object_list())
                .with_description("Inbound rules: protocol, from_port, to_port, cidr_blocks"),
        )
        .attribute(
            AttributeSchema::new("egress", aws_types::object_list())
                .with_description("Outbound rules: protocol, from_port, to_port, cidr_blocks"),
        )
        .attribute(AttributeSchema::new("tags", aws_types::tags_type()))
}

pub fn security_group_rule_schema() -> ResourceSchema {
    ResourceSchema::new("aws.security_group.rule")
        .with_description("A rule between two security groups")
        .attribute(
            AttributeSchema::new(
                "type",
                AttributeType::Enum(vec!["ingress".to_string(), "egress".to_string()]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("protocol", aws_types::protocol()).required())
        .attribute(AttributeSchema::new("from_port", types::port_number()).required())
        .attribute(AttributeSchema::new("to_port", types::port_number()).required())
        .attribute(AttributeSchema::new("security_group_id", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("source_security_group_id", AttributeType::String)
                .required()
                .with_description("The peer group; for egress rules, the destination"),
        )
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        vpc_schema(),
        subnet_schema(),
        internet_gateway_schema(),
        route_table_schema(),
        route_schema(),
        route_table_association_schema(),
        security_group_schema(),
        security_group_rule_schema(),
    ]
}
