//! Network topology - VPC, subnets, internet gateway and routing
//!
//! The network is the root of the stack: three public and three private
//! subnets carved out of a `/16`, one route table per tier, and a single
//! default route to the internet gateway on the public table.

use keel_core::resource::{Resource, Value};
use keel_core::schema::validate_cidr;

use crate::config::StackConfig;

pub const COMPONENT: &str = "network";

/// Subnets per tier, one per availability zone
pub const ZONE_COUNT: usize = 3;

pub const DEFAULT_ROUTE_CIDR: &str = "0.0.0.0/0";

/// Third octet offset of private subnets
const PRIVATE_OFFSET: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("At least {required} availability zones are required, {found} configured")]
    InsufficientZones { required: usize, found: usize },

    #[error("Invalid VPC CIDR block '{cidr}': {message}")]
    InvalidCidr { cidr: String, message: String },
}

/// Derived network resources
#[derive(Debug, Clone)]
pub struct Network {
    pub vpc: Resource,
    pub internet_gateway: Resource,
    pub public_route_table: Resource,
    pub private_route_table: Resource,
    pub default_route: Resource,
    pub public_subnets: Vec<Resource>,
    pub private_subnets: Vec<Resource>,
    pub associations: Vec<Resource>,
}

impl Network {
    pub fn vpc_id(&self) -> Value {
        self.vpc.output("id")
    }

    pub fn public_subnet_ids(&self) -> Value {
        Value::List(self.public_subnets.iter().map(|s| s.output("id")).collect())
    }

    pub fn private_subnet_ids(&self) -> Value {
        Value::List(self.private_subnets.iter().map(|s| s.output("id")).collect())
    }

    pub fn resources(&self) -> Vec<Resource> {
        let mut resources = vec![
            self.vpc.clone(),
            self.internet_gateway.clone(),
            self.public_route_table.clone(),
            self.private_route_table.clone(),
        ];
        resources.extend(self.public_subnets.iter().cloned());
        resources.extend(self.private_subnets.iter().cloned());
        resources.extend(self.associations.iter().cloned());
        resources.push(self.default_route.clone());
        resources
    }
}

/// `Name` tag map
pub(crate) fn name_tag(name: &str) -> Value {
    Value::map([("Name", Value::from(name))])
}

/// First two octets of a `/16` block
fn parent_prefix(cidr: &str) -> Result<(u8, u8), NetworkError> {
    let invalid = |message: &str| NetworkError::InvalidCidr {
        cidr: cidr.to_string(),
        message: message.to_string(),
    };

    validate_cidr(cidr).map_err(|message| invalid(&message))?;
    let (ip, prefix) = cidr.split_once('/').ok_or_else(|| invalid("expected IP/prefix"))?;
    if prefix != "16" {
        return Err(invalid("expected a /16 block"));
    }

    let octets: Vec<u8> = ip.split('.').filter_map(|o| o.parse().ok()).collect();
    match octets.as_slice() {
        [a, b, 0, 0] => Ok((*a, *b)),
        [_, _, _, _] => Err(invalid("host bits must be zero")),
        _ => Err(invalid("expected 4 octets")),
    }
}

/// Public and private subnet blocks: `A.B.i.0/24` and `A.B.(i+10).0/24`
pub fn subnet_cidrs(parent: &str) -> Result<(Vec<String>, Vec<String>), NetworkError> {
    let (a, b) = parent_prefix(parent)?;
    let blocks = |offset: u8| -> Vec<String> {
        (1..=ZONE_COUNT as u8)
            .map(|i| format!("{}.{}.{}.0/24", a, b, i + offset))
            .collect()
    };
    Ok((blocks(0), blocks(PRIVATE_OFFSET)))
}

fn subnet(
    tier: &str,
    index: usize,
    vpc: &Resource,
    cidr: &str,
    zone: &str,
    public: bool,
) -> Resource {
    let name = format!("{}-subnet-{}", tier, index);
    Resource::new("aws.subnet", &name)
        .with_attribute("vpc_id", vpc.output("id"))
        .with_attribute("cidr_block", cidr)
        .with_attribute("availability_zone", zone)
        .with_attribute("map_public_ip_on_launch", public)
        .with_attribute("tags", name_tag(&name))
        .with_component(COMPONENT)
}

fn association(tier: &str, index: usize, subnet: &Resource, table: &Resource) -> Resource {
    Resource::new("aws.route_table_association", format!("{}-rta-{}", tier, index))
        .with_attribute("subnet_id", subnet.output("id"))
        .with_attribute("route_table_id", table.output("id"))
        .with_component(COMPONENT)
}

/// Derive the network from the configured block, region and zones
pub fn build_network(config: &StackConfig) -> Result<Network, NetworkError> {
    let zones = config.zone_names();
    if zones.len() < ZONE_COUNT {
        return Err(NetworkError::InsufficientZones {
            required: ZONE_COUNT,
            found: zones.len(),
        });
    }
    let (public_cidrs, private_cidrs) = subnet_cidrs(&config.vpc_cidr)?;

    let vpc = Resource::new("aws.vpc", "custom")
        .with_attribute("cidr_block", config.vpc_cidr.as_str())
        .with_attribute("enable_dns_support", true)
        .with_attribute("enable_dns_hostnames", true)
        .with_attribute("tags", name_tag("custom"))
        .with_component(COMPONENT);

    let internet_gateway = Resource::new("aws.internet_gateway", "igw")
        .with_attribute("vpc_id", vpc.output("id"))
        .with_attribute("tags", name_tag("igw"))
        .with_component(COMPONENT);

    let route_table = |name: &str| {
        Resource::new("aws.route_table", name)
            .with_attribute("vpc_id", vpc.output("id"))
            .with_attribute("tags", name_tag(name))
            .with_component(COMPONENT)
    };
    let public_route_table = route_table("public-rt");
    let private_route_table = route_table("private-rt");

    let mut public_subnets = Vec::with_capacity(ZONE_COUNT);
    let mut private_subnets = Vec::with_capacity(ZONE_COUNT);
    let mut associations = Vec::with_capacity(ZONE_COUNT * 2);
    for (i, zone) in zones.iter().take(ZONE_COUNT).enumerate() {
        let index = i + 1;
        let public = subnet("public", index, &vpc, &public_cidrs[i], zone, true);
        let private = subnet("private", index, &vpc, &private_cidrs[i], zone, false);
        associations.push(association("public", index, &public, &public_route_table));
        associations.push(association("private", index, &private, &private_route_table));
        public_subnets.push(public);
        private_subnets.push(private);
    }

    let default_route = Resource::new("aws.route", "public-route")
        .with_attribute("route_table_id", public_route_table.output("id"))
        .with_attribute("destination_cidr_block", DEFAULT_ROUTE_CIDR)
        .with_attribute("gateway_id", internet_gateway.output("id"))
        .with_component(COMPONENT);

    log::debug!(
        "Derived network {} with {} subnets across {}",
        config.vpc_cidr,
        public_subnets.len() + private_subnets.len(),
        zones[..ZONE_COUNT].join(", ")
    );

    Ok(Network {
        vpc,
        internet_gateway,
        public_route_table,
        private_route_table,
        default_route,
        public_subnets,
        private_subnets,
        associations,
    })
}
