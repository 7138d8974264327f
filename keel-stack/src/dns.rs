//! DNS binding - Hosted zone lookup and the alias record
//!
//! The hosted zone is the only value derived from outside the stack. It is
//! looked up asynchronously; a missing or ambiguous zone fails the DNS
//! binding alone.

use keel_core::provider::BoxFuture;
use keel_core::resource::{Resource, Value};

use crate::config::StackConfig;
use crate::traffic::Traffic;

pub const COMPONENT: &str = "dns";

/// A hosted zone known to the DNS service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    pub id: String,
    pub name: String,
}

impl HostedZone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnsError {
    #[error("No hosted zone found for '{0}'")]
    ZoneNotFound(String),

    #[error("{count} hosted zones match '{domain}'")]
    AmbiguousZone { domain: String, count: usize },

    #[error("Hosted zone lookup failed: {0}")]
    Lookup(String),
}

/// Source of hosted zones
///
/// Implementations may return zones that do not match `name` exactly;
/// [`resolve_zone`] applies the exact-match rule.
pub trait ZoneLookup: Send + Sync {
    fn find_zones(&self, name: &str) -> BoxFuture<'_, Result<Vec<HostedZone>, DnsError>>;
}

/// Fixed list of zones
#[derive(Debug, Clone, Default)]
pub struct StaticZones {
    zones: Vec<HostedZone>,
}

impl StaticZones {
    pub fn new(zones: Vec<HostedZone>) -> Self {
        Self { zones }
    }

    /// The zone named by `hostedzone` in the configuration, if any
    pub fn from_config(config: &StackConfig) -> Self {
        let zones = config
            .hosted_zone
            .iter()
            .map(|id| HostedZone::new(id.clone(), config.domain.clone()))
            .collect();
        Self { zones }
    }
}

impl ZoneLookup for StaticZones {
    fn find_zones(&self, _name: &str) -> BoxFuture<'_, Result<Vec<HostedZone>, DnsError>> {
        let zones = self.zones.clone();
        Box::pin(async move { Ok(zones) })
    }
}

/// Zone names compare without the trailing dot and ignoring case
fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Find the single zone named exactly `domain`
pub async fn resolve_zone(
    lookup: &dyn ZoneLookup,
    domain: &str,
) -> Result<HostedZone, DnsError> {
    let wanted = normalize(domain);
    let mut matches: Vec<HostedZone> = lookup
        .find_zones(domain)
        .await?
        .into_iter()
        .filter(|zone| normalize(&zone.name) == wanted)
        .collect();

    match matches.len() {
        0 => Err(DnsError::ZoneNotFound(domain.to_string())),
        1 => Ok(matches.remove(0)),
        count => Err(DnsError::AmbiguousZone {
            domain: domain.to_string(),
            count,
        }),
    }
}

/// Alias A record for the domain, pointing at the load balancer
pub fn alias_record(domain: &str, zone: &HostedZone, traffic: &Traffic) -> Resource {
    Resource::new("aws.route53.record", "alias")
        .with_attribute("zone_id", zone.id.as_str())
        .with_attribute("name", domain)
        .with_attribute("type", "A")
        .with_attribute(
            "aliases",
            Value::List(vec![Value::map([
                ("name", traffic.dns_name()),
                ("zone_id", traffic.zone_id()),
                ("evaluate_target_health", Value::Bool(true)),
            ])]),
        )
        .with_component(COMPONENT)
}

pub async fn build_dns(
    config: &StackConfig,
    lookup: &dyn ZoneLookup,
    traffic: &Traffic,
) -> Result<Resource, DnsError> {
    let zone = resolve_zone(lookup, &config.domain).await?;
    log::debug!("Resolved hosted zone {} for {}", zone.id, config.domain);
    Ok(alias_record(&config.domain, &zone, traffic))
}
