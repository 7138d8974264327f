//! Security policy - Boundaries and the rules between them
//!
//! Rules against CIDR peers live inline on their boundary. Rules between two
//! boundaries are standalone resources and are always created in pairs by
//! [`allow_between`]: an egress on the source and an ingress on the
//! destination.

use std::fmt;

use keel_core::resource::{Resource, Value};

use crate::config::StackConfig;
use crate::network::{Network, name_tag};

pub const COMPONENT: &str = "security";

pub const RULE_TYPE: &str = "aws.security_group.rule";

pub const ANYWHERE: &str = "0.0.0.0/0";

pub const SSH_PORT: i64 = 22;
pub const HTTP_PORT: i64 = 80;
pub const HTTPS_PORT: i64 = 443;
pub const DATABASE_PORT: i64 = 5432;
pub const APPLICATION_PORT: i64 = 8080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        }
    }

    fn opposite(&self) -> Self {
        match self {
            Direction::Ingress => Direction::Egress,
            Direction::Egress => Direction::Ingress,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "ingress" => Some(Direction::Ingress),
            "egress" => Some(Direction::Egress),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inline rule whose peer is a CIDR block
#[derive(Debug, Clone, PartialEq)]
pub struct CidrRule {
    pub protocol: &'static str,
    pub from_port: i64,
    pub to_port: i64,
    pub cidr: &'static str,
}

impl CidrRule {
    pub fn tcp(port: i64, cidr: &'static str) -> Self {
        Self {
            protocol: "tcp",
            from_port: port,
            to_port: port,
            cidr,
        }
    }

    /// Every protocol and port
    pub fn all(cidr: &'static str) -> Self {
        Self {
            protocol: "-1",
            from_port: 0,
            to_port: 0,
            cidr,
        }
    }

    fn to_value(&self) -> Value {
        Value::map([
            ("protocol", Value::from(self.protocol)),
            ("from_port", Value::Int(self.from_port)),
            ("to_port", Value::Int(self.to_port)),
            ("cidr_blocks", Value::string_list([self.cidr])),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("Rule '{rule}' has no matching {expected} rule on '{peer}'")]
    Unreciprocated {
        rule: String,
        expected: Direction,
        peer: String,
    },

    #[error("Rule '{rule}' is malformed: missing {attribute}")]
    Malformed { rule: String, attribute: String },
}

/// Boundary resource with inline CIDR rules
fn boundary(
    name: &str,
    description: &str,
    network: &Network,
    ingress: &[CidrRule],
    egress: &[CidrRule],
) -> Resource {
    Resource::new("aws.security_group", name)
        .with_attribute("vpc_id", network.vpc_id())
        .with_attribute("description", description)
        .with_attribute(
            "ingress",
            Value::List(ingress.iter().map(CidrRule::to_value).collect()),
        )
        .with_attribute(
            "egress",
            Value::List(egress.iter().map(CidrRule::to_value).collect()),
        )
        .with_attribute("tags", name_tag(name))
        .with_component(COMPONENT)
}

/// Allow TCP `port` from `source` to `destination`
///
/// Returns the egress rule on the source and the ingress rule on the
/// destination. For the egress rule `source_security_group_id` names the
/// destination, as the provider API expects.
pub fn allow_between(source: &Resource, destination: &Resource, port: i64) -> [Resource; 2] {
    let rule = |direction: Direction, owner: &Resource, peer: &Resource| {
        Resource::new(
            RULE_TYPE,
            format!(
                "{}-to-{}-{}-{}",
                source.name(),
                destination.name(),
                port,
                direction
            ),
        )
        .with_attribute("type", direction.as_str())
        .with_attribute("protocol", "tcp")
        .with_attribute("from_port", port)
        .with_attribute("to_port", port)
        .with_attribute("security_group_id", owner.output("id"))
        .with_attribute("source_security_group_id", peer.output("id"))
        .with_component(COMPONENT)
    };

    [
        rule(Direction::Egress, source, destination),
        rule(Direction::Ingress, destination, source),
    ]
}

/// Derived boundaries and their cross-boundary rules
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    pub application: Resource,
    pub database: Resource,
    pub load_balancer: Resource,
    pub rules: Vec<Resource>,
}

/// Parsed cross-boundary rule
#[derive(Debug, PartialEq)]
struct Edge<'a> {
    name: &'a str,
    direction: Direction,
    owner: &'a str,
    peer: &'a str,
    protocol: &'a str,
    from_port: i64,
    to_port: i64,
}

impl<'a> Edge<'a> {
    fn parse(rule: &'a Resource) -> Result<Self, PolicyError> {
        let malformed = |attribute: &str| PolicyError::Malformed {
            rule: rule.name().to_string(),
            attribute: attribute.to_string(),
        };
        let target = |key: &str| match rule.get(key) {
            Some(Value::ResourceRef(name, _)) => Ok(name.as_str()),
            _ => Err(malformed(key)),
        };
        let int = |key: &str| rule.get(key).and_then(Value::as_int).ok_or_else(|| malformed(key));

        Ok(Edge {
            name: rule.name(),
            direction: rule
                .get("type")
                .and_then(Value::as_str)
                .and_then(Direction::parse)
                .ok_or_else(|| malformed("type"))?,
            owner: target("security_group_id")?,
            peer: target("source_security_group_id")?,
            protocol: rule
                .get("protocol")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("protocol"))?,
            from_port: int("from_port")?,
            to_port: int("to_port")?,
        })
    }

    fn mirrors(&self, other: &Edge<'_>) -> bool {
        other.direction == self.direction.opposite()
            && other.owner == self.peer
            && other.peer == self.owner
            && other.protocol == self.protocol
            && other.from_port == self.from_port
            && other.to_port == self.to_port
    }
}

impl SecurityPolicy {
    pub fn application_id(&self) -> Value {
        self.application.output("id")
    }

    pub fn database_id(&self) -> Value {
        self.database.output("id")
    }

    pub fn load_balancer_id(&self) -> Value {
        self.load_balancer.output("id")
    }

    pub fn resources(&self) -> Vec<Resource> {
        let mut resources = vec![
            self.application.clone(),
            self.database.clone(),
            self.load_balancer.clone(),
        ];
        resources.extend(self.rules.iter().cloned());
        resources
    }

    /// Every cross-boundary rule must have its mirror on the peer boundary
    pub fn verify_reciprocity(&self) -> Result<(), PolicyError> {
        let edges = self
            .rules
            .iter()
            .map(Edge::parse)
            .collect::<Result<Vec<_>, _>>()?;

        for edge in &edges {
            if !edges.iter().any(|other| edge.mirrors(other)) {
                return Err(PolicyError::Unreciprocated {
                    rule: edge.name.to_string(),
                    expected: edge.direction.opposite(),
                    peer: edge.peer.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Derive the application, database and load balancer boundaries
pub fn build_security(config: &StackConfig, network: &Network) -> SecurityPolicy {
    let application = boundary(
        "app-sg",
        "Application instances",
        network,
        &[CidrRule::tcp(SSH_PORT, ANYWHERE)],
        &[CidrRule::all(ANYWHERE)],
    );
    let database = boundary("db-sg", "Database instances", network, &[], &[]);

    let mut lb_ingress = vec![CidrRule::tcp(HTTPS_PORT, ANYWHERE)];
    if config.allow_http {
        lb_ingress.push(CidrRule::tcp(HTTP_PORT, ANYWHERE));
    }
    let load_balancer = boundary("lb-sg", "Load balancer", network, &lb_ingress, &[]);

    let mut rules = Vec::with_capacity(4);
    rules.extend(allow_between(&application, &database, DATABASE_PORT));
    rules.extend(allow_between(&load_balancer, &application, APPLICATION_PORT));

    log::debug!(
        "Derived 3 security boundaries with {} cross-boundary rules",
        rules.len()
    );

    SecurityPolicy {
        application,
        database,
        load_balancer,
        rules,
    }
}
