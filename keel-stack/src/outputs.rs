//! Exported outputs of the stack

use std::collections::{BTreeMap, HashMap};

use keel_core::resource::{State, UnresolvedRef, Value};

use crate::database::Database;
use crate::network::Network;
use crate::security::SecurityPolicy;
use crate::storage::Stores;

/// A named value exported once the stack is materialized
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: &'static str,
    pub value: Value,
    pub sensitive: bool,
}

impl Output {
    pub fn new(name: &'static str, value: Value) -> Self {
        Self {
            name,
            value,
            sensitive: false,
        }
    }

    pub fn secret(name: &'static str, value: Value) -> Self {
        Self {
            name,
            value,
            sensitive: true,
        }
    }
}

pub fn exports(
    network: &Network,
    security: &SecurityPolicy,
    database: &Database,
    stores: &Stores,
) -> Vec<Output> {
    vec![
        Output::new("vpcId", network.vpc_id()),
        Output::new("publicSubnetsIds", network.public_subnet_ids()),
        Output::new("privateSubnetsIds", network.private_subnet_ids()),
        Output::new("appSecurityGroupId", security.application_id()),
        Output::new("databaseSecurityGroupId", security.database_id()),
        Output::new("loadBalancerSecurityGroupId", security.load_balancer_id()),
        Output::new("rdsInstanceId", database.instance_id()),
        Output::new("bucketName", stores.bucket_name()),
        Output::new("accountKeyName", stores.account_key.output("name")),
        Output::new("accountId", stores.account_key.output("id")),
        Output::secret("privateKey", stores.private_key()),
        Output::new("serviceAccountEmail", stores.service_account.output("email")),
    ]
}

/// Resolve every output against materialized states
///
/// An output whose owner never materialized stays an error; the others
/// resolve regardless.
pub fn resolve_outputs(
    outputs: &[Output],
    states: &HashMap<String, State>,
) -> BTreeMap<String, Result<Value, UnresolvedRef>> {
    let lookup = |name: &str, attribute: &str| -> Option<Value> {
        states
            .get(name)
            .filter(|s| s.exists)
            .and_then(|s| s.attribute(attribute))
    };

    outputs
        .iter()
        .map(|output| {
            let value = output.value.resolve(&lookup).map(|v| {
                if output.sensitive && !v.is_sensitive() {
                    Value::secret(v)
                } else {
                    v
                }
            });
            (output.name.to_string(), value)
        })
        .collect()
}

/// JSON object of resolved outputs; secrets are redacted unless shown
pub fn outputs_to_json(
    resolved: &BTreeMap<String, Result<Value, UnresolvedRef>>,
    show_secrets: bool,
) -> serde_json::Value {
    let object: serde_json::Map<String, serde_json::Value> = resolved
        .iter()
        .filter_map(|(name, value)| {
            let value = value.as_ref().ok()?;
            let json = if show_secrets {
                value.expose().to_json()
            } else {
                value.to_json()
            };
            Some((name.clone(), json))
        })
        .collect();
    serde_json::Value::Object(object)
}
