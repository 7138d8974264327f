//! Simulated provider - Materializes resources without a cloud
//!
//! Identifiers and provider-computed attributes (ARNs, endpoints, e-mail
//! addresses, keys) are synthesized from a counter, so a run is
//! reproducible. State can be kept in a JSON file between runs.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use keel_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State, Value};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STATE_FILE: &str = ".keel/state.json";

/// Account every synthesized ARN belongs to
pub const ACCOUNT_ID: &str = "123456789012";

/// Hosted zone id of application load balancers
const LOAD_BALANCER_ZONE_ID: &str = "Z35SXDOTRQ7X7K";

#[derive(Debug, thiserror::Error)]
pub enum StateFileError {
    #[error("Failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported state file version {0}")]
    UnsupportedVersion(u32),
}

/// On-disk form of the simulated state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Next value of the identifier counter
    #[serde(default)]
    pub next_id: u64,
    pub resources: Vec<ResourceRecord>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            next_id: 1,
            resources: Vec::new(),
        }
    }

    pub fn find(&self, id: &ResourceId) -> Option<&ResourceRecord> {
        self.resources.iter().find(|r| &r.id == id)
    }

    pub fn load(path: &Path) -> Result<Self, StateFileError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(StateFileError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let file: StateFile =
            serde_json::from_str(&content).map_err(|source| StateFileError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if file.version > Self::CURRENT_VERSION {
            return Err(StateFileError::UnsupportedVersion(file.version));
        }
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<(), StateFileError> {
        let io_error = |source| StateFileError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| StateFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(io_error)
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// One materialized resource
///
/// Sensitive attributes are written redacted and listed in `redacted`.
/// They are dropped on reload, so nothing downstream can resolve against
/// the placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(flatten)]
    pub id: ResourceId,
    pub identifier: String,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redacted: Vec<String>,
}

impl ResourceRecord {
    fn from_state(state: &State) -> Option<Self> {
        let identifier = state.identifier.clone()?;
        let attributes = state
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        let mut redacted: Vec<String> = state
            .attributes
            .iter()
            .filter(|(_, v)| v.is_sensitive())
            .map(|(k, _)| k.clone())
            .collect();
        redacted.sort();
        Some(Self {
            id: state.id.clone(),
            identifier,
            attributes,
            redacted,
        })
    }

    fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .filter(|(k, _)| !self.redacted.contains(*k))
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();
        State::existing(self.id.clone(), attributes).with_identifier(self.identifier.clone())
    }
}

#[derive(Debug, Default)]
struct Ledger {
    live: HashMap<String, State>,
    next_id: u64,
    serial: u64,
}

impl Ledger {
    fn to_file(&self) -> StateFile {
        let mut resources: Vec<ResourceRecord> =
            self.live.values().filter_map(ResourceRecord::from_state).collect();
        resources.sort_by(|a, b| a.id.name.cmp(&b.id.name));
        StateFile {
            version: StateFile::CURRENT_VERSION,
            serial: self.serial,
            next_id: self.next_id,
            resources,
        }
    }
}

/// Provider that keeps everything in memory
pub struct SimulatedProvider {
    region: String,
    state_file: Option<PathBuf>,
    ledger: Mutex<Ledger>,
    failing: HashSet<String>,
}

impl SimulatedProvider {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state_file: None,
            ledger: Mutex::new(Ledger {
                next_id: 1,
                ..Default::default()
            }),
            failing: HashSet::new(),
        }
    }

    /// Provider backed by a state file; an absent file means empty state
    pub fn open(
        region: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self, StateFileError> {
        let path = path.into();
        let file = StateFile::load(&path)?;
        let live = file
            .resources
            .iter()
            .map(|record| (record.id.name.clone(), record.to_state()))
            .collect();
        log::debug!(
            "Loaded {} resources from {} (serial {})",
            file.resources.len(),
            path.display(),
            file.serial
        );

        Ok(Self {
            region: region.into(),
            state_file: Some(path),
            ledger: Mutex::new(Ledger {
                live,
                next_id: file.next_id.max(1),
                serial: file.serial,
            }),
            failing: HashSet::new(),
        })
    }

    /// Make every `create` of the named resource fail
    pub fn with_failure(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Every materialized resource, keyed by logical name
    pub fn states(&self) -> HashMap<String, State> {
        self.ledger
            .lock()
            .map(|ledger| ledger.live.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> ProviderResult<std::sync::MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|_| ProviderError::new("Simulated state lock poisoned"))
    }

    fn persist(&self, ledger: &mut Ledger) -> ProviderResult<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        ledger.serial += 1;
        ledger
            .to_file()
            .save(path)
            .map_err(|e| ProviderError::new("Failed to save state").with_cause(e))
    }

    fn materialize(&self, resource: &Resource, ledger: &mut Ledger) -> ProviderResult<State> {
        if self.failing.contains(resource.name()) {
            return Err(ProviderError::new("Simulated failure").for_resource(resource.id.clone()));
        }
        if ledger.live.contains_key(resource.name()) {
            return Err(ProviderError::new("Resource already exists")
                .for_resource(resource.id.clone()));
        }
        if let Some((key, _)) = resource.public_attributes().find(|(_, v)| v.is_deferred()) {
            return Err(ProviderError::new(format!("Attribute '{}' is not resolved", key))
                .for_resource(resource.id.clone()));
        }

        let serial = ledger.next_id;
        ledger.next_id += 1;

        let mut attributes: HashMap<String, Value> = resource
            .public_attributes()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let (identifier, computed) = self.synthesize(resource, serial);
        for (key, value) in computed {
            attributes.entry(key.to_string()).or_insert(value);
        }

        let state = State::existing(resource.id.clone(), attributes).with_identifier(identifier);
        ledger.live.insert(resource.name().to_string(), state.clone());
        Ok(state)
    }

    fn arn(&self, service: &str, resource: &str) -> String {
        format!("arn:aws:{}:{}:{}:{}", service, self.region, ACCOUNT_ID, resource)
    }

    /// Provider identifier plus attributes a real engine would compute
    fn synthesize(&self, resource: &Resource, serial: u64) -> (String, Vec<(&'static str, Value)>) {
        let hex = format!("{:017x}", serial);
        let short = &hex[hex.len() - 8..];
        let name = resource.name();
        let text = |key: &str| {
            resource
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string()
        };
        let prefixed = |prefix: &str| format!("{}-{}", prefix, hex);

        match resource.id.resource_type.as_str() {
            "aws.vpc" => (prefixed("vpc"), vec![]),
            "aws.subnet" => (prefixed("subnet"), vec![]),
            "aws.internet_gateway" => (prefixed("igw"), vec![]),
            "aws.route_table" => (prefixed("rtb"), vec![]),
            "aws.route_table_association" => (prefixed("rtbassoc"), vec![]),
            "aws.route" => (prefixed("r"), vec![]),
            "aws.security_group" => {
                let id = prefixed("sg");
                let arn = self.arn("ec2", &format!("security-group/{}", id));
                (id, vec![("arn", Value::from(arn))])
            }
            "aws.security_group.rule" => (prefixed("sgr"), vec![]),
            "aws.ec2.launch_template" => {
                let id = prefixed("lt");
                (id, vec![("latest_version", Value::Int(1))])
            }
            "aws.rds.parameter_group" | "aws.rds.subnet_group" => {
                let group = format!("{}-{}", name, short);
                (group.clone(), vec![("name", Value::from(group))])
            }
            "aws.rds.instance" => {
                let id = format!("db-{}", hex.to_ascii_uppercase());
                let address = format!("{}.c{}.{}.rds.amazonaws.com", name, short, self.region);
                let port = resource.get("port").and_then(Value::as_int).unwrap_or(5432);
                (
                    id,
                    vec![
                        ("endpoint", Value::from(format!("{}:{}", address, port))),
                        ("address", Value::from(address)),
                        ("arn", Value::from(self.arn("rds", &format!("db:{}", name)))),
                    ],
                )
            }
            "aws.iam.role" | "aws.iam.instance_profile" => {
                let kind = if resource.id.resource_type == "aws.iam.role" {
                    "role"
                } else {
                    "instance-profile"
                };
                let iam_name = format!("{}-{}", name, short);
                let arn = format!("arn:aws:iam::{}:{}/{}", ACCOUNT_ID, kind, iam_name);
                (
                    iam_name.clone(),
                    vec![("name", Value::from(iam_name)), ("arn", Value::from(arn))],
                )
            }
            "aws.iam.policy" => {
                let arn = format!("arn:aws:iam::{}:policy/{}-{}", ACCOUNT_ID, name, short);
                (arn.clone(), vec![("arn", Value::from(arn))])
            }
            "aws.iam.role_policy_attachment" => (format!("{}-{}", text("role"), short), vec![]),
            "aws.lb.target_group" => {
                let arn = self.arn(
                    "elasticloadbalancing",
                    &format!("targetgroup/{}/{}", name, short),
                );
                (arn.clone(), vec![("arn", Value::from(arn))])
            }
            "aws.lb.load_balancer" => {
                let arn = self.arn(
                    "elasticloadbalancing",
                    &format!("loadbalancer/app/{}/{}", name, short),
                );
                let dns_name = format!("{}-{}.{}.elb.amazonaws.com", name, serial, self.region);
                (
                    arn.clone(),
                    vec![
                        ("arn", Value::from(arn)),
                        ("dns_name", Value::from(dns_name)),
                        ("zone_id", Value::from(LOAD_BALANCER_ZONE_ID)),
                    ],
                )
            }
            "aws.lb.listener" => {
                let arn = self.arn(
                    "elasticloadbalancing",
                    &format!("listener/app/{}/{}", name, short),
                );
                (arn.clone(), vec![("arn", Value::from(arn))])
            }
            "aws.autoscaling.group" => {
                let group = text("name");
                let arn = self.arn(
                    "autoscaling",
                    &format!("autoScalingGroup:{}:autoScalingGroupName/{}", hex, group),
                );
                (
                    group.clone(),
                    vec![("name", Value::from(group)), ("arn", Value::from(arn))],
                )
            }
            "aws.autoscaling.policy" => {
                let arn = self.arn(
                    "autoscaling",
                    &format!(
                        "scalingPolicy:{}:autoScalingGroupName/{}:policyName/{}",
                        hex,
                        text("autoscaling_group_name"),
                        name
                    ),
                );
                (arn.clone(), vec![("arn", Value::from(arn))])
            }
            "aws.cloudwatch.metric_alarm" => {
                let arn = self.arn("cloudwatch", &format!("alarm:{}", name));
                (name.to_string(), vec![("arn", Value::from(arn))])
            }
            "aws.route53.record" => (
                format!("{}_{}_{}", text("zone_id"), text("name"), text("type")),
                vec![("fqdn", Value::from(text("name")))],
            ),
            "aws.dynamodb.table" => {
                let table = text("name");
                let arn = self.arn("dynamodb", &format!("table/{}", table));
                (
                    table.clone(),
                    vec![("name", Value::from(table)), ("arn", Value::from(arn))],
                )
            }
            "aws.sns.topic" => {
                let arn = self.arn("sns", &format!("{}-{}", name, short));
                (arn.clone(), vec![("arn", Value::from(arn))])
            }
            "aws.sns.topic_subscription" => {
                let arn = format!("{}:{}", text("topic"), hex);
                (arn.clone(), vec![("arn", Value::from(arn))])
            }
            "aws.lambda.function" => {
                let function = text("function_name");
                let arn = self.arn("lambda", &format!("function:{}", function));
                (
                    function.clone(),
                    vec![
                        ("function_name", Value::from(function)),
                        ("arn", Value::from(arn)),
                    ],
                )
            }
            "aws.lambda.permission" => (format!("{}-{}", name, short), vec![]),
            "gcp.storage.bucket" => {
                let bucket = format!("{}-{}", name, short);
                (
                    bucket.clone(),
                    vec![
                        ("url", Value::from(format!("gs://{}", bucket))),
                        ("name", Value::from(bucket)),
                    ],
                )
            }
            "gcp.service_account" => {
                let email = format!(
                    "{}@{}.iam.gserviceaccount.com",
                    text("account_id"),
                    text("project")
                );
                let account = format!("projects/{}/serviceAccounts/{}", text("project"), email);
                (
                    account.clone(),
                    vec![
                        ("name", Value::from(account)),
                        ("email", Value::from(email)),
                        ("unique_id", Value::from(serial.to_string())),
                    ],
                )
            }
            "gcp.service_account_key" => {
                let key = format!("{}/keys/{}", text("service_account_id"), hex);
                let document = format!(
                    "{{\"type\":\"service_account\",\"private_key_id\":\"{}\"}}",
                    hex
                );
                (
                    key.clone(),
                    vec![
                        ("name", Value::from(key)),
                        ("private_key", Value::secret(STANDARD.encode(document))),
                    ],
                )
            }
            "gcp.iam.custom_role" => {
                let role = format!("projects/{}/roles/{}", text("project"), text("role_id"));
                (role.clone(), vec![("name", Value::from(role))])
            }
            "gcp.iam.member" => (
                format!("{}/{}/{}", text("project"), text("role"), text("member")),
                vec![],
            ),
            other => {
                let kind = other.rsplit('.').next().unwrap_or(other);
                (format!("{}-{}", kind, hex), vec![])
            }
        }
    }
}

impl Provider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_string);
        Box::pin(async move {
            let ledger = self.lock()?;
            let state = ledger.live.get(&id.name).filter(|state| {
                state.id == id
                    && identifier
                        .as_deref()
                        .is_none_or(|wanted| state.identifier.as_deref() == Some(wanted))
            });
            Ok(state.cloned().unwrap_or_else(|| State::not_found(id)))
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            let mut ledger = self.lock()?;
            let state = self.materialize(&resource, &mut ledger)?;
            self.persist(&mut ledger)?;
            Ok(state)
        })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let mut ledger = self.lock()?;
            let known = ledger
                .live
                .get(&id.name)
                .is_some_and(|state| state.identifier.as_deref() == Some(identifier.as_str()));
            if !known {
                return Err(ProviderError::new(format!("No resource with identifier {}", identifier))
                    .for_resource(id));
            }
            ledger.live.remove(&id.name);
            self.persist(&mut ledger)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> Resource {
        Resource::new("aws.sns.topic", "my-topic").with_attribute("display_name", "My SNS Topic")
    }

    #[tokio::test]
    async fn create_synthesizes_identifiers() {
        let provider = SimulatedProvider::new("us-east-1");
        let state = provider
            .create(
                &Resource::new("aws.vpc", "custom").with_attribute("cidr_block", "172.16.0.0/16"),
            )
            .await
            .unwrap();

        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("vpc-00000000000000001"));
        assert_eq!(
            state.attribute("id"),
            Some(Value::from("vpc-00000000000000001"))
        );
        assert_eq!(
            state.attribute("cidr_block").and_then(|v| v.as_str().map(str::to_string)),
            Some("172.16.0.0/16".to_string())
        );
    }

    #[tokio::test]
    async fn topic_arn_uses_region_and_account() {
        let provider = SimulatedProvider::new("us-west-2");
        let state = provider.create(&topic()).await.unwrap();
        let arn = state.attribute("arn").unwrap();
        assert!(
            arn.as_str()
                .unwrap()
                .starts_with("arn:aws:sns:us-west-2:123456789012:my-topic-")
        );
    }

    #[tokio::test]
    async fn service_account_key_is_secret() {
        let provider = SimulatedProvider::new("us-east-1");
        let account = provider
            .create(
                &Resource::new("gcp.service_account", "account")
                    .with_attribute("account_id", "my-service-account")
                    .with_attribute("project", "webapp-project"),
            )
            .await
            .unwrap();
        assert_eq!(
            account.attribute("email"),
            Some(Value::from(
                "my-service-account@webapp-project.iam.gserviceaccount.com"
            ))
        );

        let key = provider
            .create(
                &Resource::new("gcp.service_account_key", "account-key")
                    .with_attribute("service_account_id", account.attribute("name").unwrap()),
            )
            .await
            .unwrap();
        assert!(key.attribute("private_key").unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn unresolved_attributes_are_rejected() {
        let provider = SimulatedProvider::new("us-east-1");
        let err = provider
            .create(
                &Resource::new("aws.subnet", "public-subnet-1")
                    .with_attribute("vpc_id", Value::reference("custom", "id")),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("vpc_id"));
    }

    #[tokio::test]
    async fn injected_failure() {
        let provider = SimulatedProvider::new("us-east-1").with_failure("my-topic");
        let err = provider.create(&topic()).await.unwrap_err();
        assert_eq!(err.to_string(), "[aws.sns.topic.my-topic] Simulated failure");
    }

    #[tokio::test]
    async fn delete_requires_matching_identifier() {
        let provider = SimulatedProvider::new("us-east-1");
        let state = provider.create(&topic()).await.unwrap();
        let id = ResourceId::new("aws.sns.topic", "my-topic");

        assert!(provider.delete(&id, "arn:aws:sns:bogus").await.is_err());
        provider
            .delete(&id, state.identifier.as_deref().unwrap())
            .await
            .unwrap();
        assert!(!provider.read(&id, None).await.unwrap().exists);
    }

    #[tokio::test]
    async fn state_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let provider = SimulatedProvider::open("us-east-1", &path).unwrap();
        provider.create(&topic()).await.unwrap();
        provider
            .create(
                &Resource::new("aws.rds.instance", "my-rds-instance")
                    .with_attribute("password", Value::secret("s3cret-pass")),
            )
            .await
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("s3cret-pass"));

        let file = StateFile::load(&path).unwrap();
        let id = ResourceId::new("aws.rds.instance", "my-rds-instance");
        assert_eq!(file.find(&id).unwrap().redacted, vec!["password".to_string()]);
        let topic = file.find(&ResourceId::new("aws.sns.topic", "my-topic")).unwrap();
        assert!(topic.redacted.is_empty());

        let reopened = SimulatedProvider::open("us-east-1", &path).unwrap();
        let states = reopened.states();
        assert_eq!(states.len(), 2);
        assert!(states["my-topic"].exists);
        // The placeholder is never handed out as the password
        assert_eq!(states["my-rds-instance"].attribute("password"), None);
        assert!(states["my-rds-instance"].attribute("address").is_some());

        // Counter continues where the last run stopped
        let next = reopened
            .create(&Resource::new("aws.vpc", "custom"))
            .await
            .unwrap();
        assert_eq!(next.identifier.as_deref(), Some("vpc-00000000000000003"));
    }

    #[test]
    fn missing_state_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SimulatedProvider::open("us-east-1", dir.path().join("none.json")).unwrap();
        assert!(provider.states().is_empty());
    }

    #[test]
    fn newer_state_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"version": 99, "serial": 1, "resources": []}"#).unwrap();
        assert!(matches!(
            StateFile::load(&path),
            Err(StateFileError::UnsupportedVersion(99))
        ));
    }
}
