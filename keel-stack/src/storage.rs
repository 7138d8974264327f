//! Auxiliary stores and cross-cloud identity
//!
//! A key-value table on the primary cloud, an object bucket on the second
//! cloud, and a service identity there that may only create objects.

use keel_core::resource::{Resource, Value};

use crate::config::StackConfig;

pub const COMPONENT: &str = "storage";

pub const SERVICE_ACCOUNT_ID: &str = "my-service-account";
pub const CUSTOM_ROLE_ID: &str = "StorageObjectCreator";

/// The single permission granted to the service identity
pub const OBJECT_CREATE_PERMISSION: &str = "storage.objects.create";

#[derive(Debug, Clone)]
pub struct Stores {
    pub table: Resource,
    pub bucket: Resource,
    pub service_account: Resource,
    pub account_key: Resource,
    pub custom_role: Resource,
    pub role_binding: Resource,
}

impl Stores {
    pub fn table_name(&self) -> Value {
        self.table.output("name")
    }

    pub fn bucket_name(&self) -> Value {
        self.bucket.output("name")
    }

    /// Generated credential of the service identity (secret)
    pub fn private_key(&self) -> Value {
        self.account_key.output("private_key")
    }

    pub fn resources(&self) -> Vec<Resource> {
        vec![
            self.table.clone(),
            self.bucket.clone(),
            self.service_account.clone(),
            self.account_key.clone(),
            self.custom_role.clone(),
            self.role_binding.clone(),
        ]
    }
}

pub fn build_stores(config: &StackConfig) -> Stores {
    let table = Resource::new("aws.dynamodb.table", "dynamodb-table")
        .with_attribute("name", config.table_name.as_str())
        .with_attribute(
            "attributes",
            Value::List(vec![Value::map([
                ("name", Value::from("id")),
                ("type", Value::from("S")),
            ])]),
        )
        .with_attribute("hash_key", "id")
        .with_attribute("billing_mode", "PAY_PER_REQUEST")
        .with_attribute(
            "tags",
            Value::map([("Name", Value::from(config.table_name.as_str()))]),
        )
        .with_component(COMPONENT);

    let bucket = Resource::new("gcp.storage.bucket", "my-bucket")
        .with_attribute("project", config.project.as_str())
        .with_attribute("location", config.bucket_location.as_str())
        .with_attribute("force_destroy", true)
        .with_component(COMPONENT);

    let service_account = Resource::new("gcp.service_account", "account")
        .with_attribute("account_id", SERVICE_ACCOUNT_ID)
        .with_attribute("display_name", "My Service Account")
        .with_attribute("project", config.project.as_str())
        .with_component(COMPONENT);

    let account_key = Resource::new("gcp.service_account_key", "account-key")
        .with_attribute("service_account_id", service_account.output("name"))
        .with_component(COMPONENT);

    let custom_role = Resource::new("gcp.iam.custom_role", "storage-object-creator")
        .with_attribute("role_id", CUSTOM_ROLE_ID)
        .with_attribute("title", "Storage Object Creator")
        .with_attribute("permissions", Value::string_list([OBJECT_CREATE_PERMISSION]))
        .with_attribute("project", config.project.as_str())
        .with_component(COMPONENT);

    let role_binding = Resource::new("gcp.iam.member", "storage-object-creator-binding")
        .with_attribute("project", config.project.as_str())
        .with_attribute("role", custom_role.output("name"))
        .with_attribute(
            "member",
            Value::Interpolate(vec![
                Value::from("serviceAccount:"),
                service_account.output("email"),
            ]),
        )
        .with_component(COMPONENT);

    log::debug!(
        "Derived table {}, bucket in {} and identity {}",
        config.table_name,
        config.bucket_location,
        SERVICE_ACCOUNT_ID
    );

    Stores {
        table,
        bucket,
        service_account,
        account_key,
        custom_role,
        role_binding,
    }
}
