//! Data tier - Relational database in the private subnets

use keel_core::resource::{Resource, Value};

use crate::config::StackConfig;
use crate::network::{Network, name_tag};
use crate::security::{DATABASE_PORT, SecurityPolicy};

pub const COMPONENT: &str = "database";

pub const PARAMETER_GROUP_FAMILY: &str = "postgres15";

#[derive(Debug, Clone)]
pub struct Database {
    pub parameter_group: Resource,
    pub subnet_group: Resource,
    pub instance: Resource,
}

impl Database {
    /// Host name, known once the instance exists
    pub fn address(&self) -> Value {
        self.instance.output("address")
    }

    pub fn instance_id(&self) -> Value {
        self.instance.output("id")
    }

    pub fn resources(&self) -> Vec<Resource> {
        vec![
            self.parameter_group.clone(),
            self.subnet_group.clone(),
            self.instance.clone(),
        ]
    }
}

pub fn build_database(
    config: &StackConfig,
    network: &Network,
    security: &SecurityPolicy,
) -> Database {
    let parameter_group = Resource::new("aws.rds.parameter_group", "rds-parameter-group")
        .with_attribute("family", PARAMETER_GROUP_FAMILY)
        .with_attribute("description", "Database parameter overrides")
        .with_attribute(
            "parameters",
            Value::List(vec![Value::map([
                ("name", Value::from("rds.force_ssl")),
                ("value", Value::from("0")),
            ])]),
        )
        .with_component(COMPONENT);

    let subnet_group = Resource::new("aws.rds.subnet_group", "rds-subnet-group")
        .with_attribute("subnet_ids", network.private_subnet_ids())
        .with_attribute("tags", name_tag("rds-subnet-group"))
        .with_component(COMPONENT);

    let instance = Resource::new("aws.rds.instance", "my-rds-instance")
        .with_attribute("engine", config.db_engine.as_str())
        .with_attribute("instance_class", config.db_instance_class.as_str())
        .with_attribute("allocated_storage", config.db_allocated_storage)
        .with_attribute("storage_type", config.db_storage_type.as_str())
        .with_attribute("db_name", config.db_name.as_str())
        .with_attribute("username", config.db_username.as_str())
        .with_attribute("password", config.db_password.to_value())
        .with_attribute("port", DATABASE_PORT)
        .with_attribute("parameter_group_name", parameter_group.output("name"))
        .with_attribute("db_subnet_group_name", subnet_group.output("name"))
        .with_attribute(
            "vpc_security_group_ids",
            Value::List(vec![security.database_id()]),
        )
        .with_attribute("publicly_accessible", false)
        .with_attribute("multi_az", false)
        .with_attribute("skip_final_snapshot", true)
        .with_component(COMPONENT);

    log::debug!(
        "Derived {} database {} ({})",
        config.db_engine,
        instance.name(),
        config.db_instance_class
    );

    Database {
        parameter_group,
        subnet_group,
        instance,
    }
}
