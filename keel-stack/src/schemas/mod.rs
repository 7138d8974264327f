//! Resource schema definitions

pub mod compute;
pub mod network;
pub mod services;
pub mod types;

use std::collections::HashMap;

use keel_core::schema::ResourceSchema;

/// Returns every schema the stack derives resources for
pub fn all_schemas() -> Vec<ResourceSchema> {
    let mut schemas = Vec::new();
    schemas.extend(network::schemas());
    schemas.extend(compute::schemas());
    schemas.extend(services::schemas());
    schemas
}

/// Schemas keyed by resource type
pub fn schemas_by_type() -> HashMap<String, ResourceSchema> {
    all_schemas()
        .into_iter()
        .map(|schema| (schema.resource_type.clone(), schema))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_types_are_unique() {
        assert_eq!(schemas_by_type().len(), all_schemas().len());
    }

    #[test]
    fn known_types_are_present() {
        let schemas = schemas_by_type();
        for resource_type in [
            "aws.vpc",
            "aws.security_group.rule",
            "aws.rds.instance",
            "aws.ec2.launch_template",
            "aws.route53.record",
            "gcp.iam.member",
        ] {
            assert!(schemas.contains_key(resource_type), "{}", resource_type);
        }
    }
}
