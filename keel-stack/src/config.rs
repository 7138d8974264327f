//! Configuration - Named values the stack is derived from
//!
//! Values come from a JSON object (usually `keel.json`) and may be
//! overridden with `key=value` assignments. The raw [`ConfigSource`] is
//! validated once into a [`StackConfig`]; derivation never reads raw keys.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use keel_core::resource::{REDACTED, Value};
use serde_json::Value as Json;

/// Keys that must be present before anything is derived
pub const REQUIRED_KEYS: &[&str] = &[
    "region",
    "name",
    "username",
    "password",
    "appPort",
    "certificateArn",
    "ami",
    "keyPair",
    "domain",
    "project",
    "tableName",
    "mailgun_api_key",
];

pub const DEFAULT_VPC_CIDR: &str = "172.16.0.0/16";
pub const DEFAULT_ZONE_SUFFIXES: &[&str] = &["a", "b", "c"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration must be a JSON object")]
    NotAnObject,

    #[error("Invalid override '{0}': expected key=value")]
    InvalidOverride(String),

    #[error("Missing required configuration keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Raw configuration values, before validation
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    values: BTreeMap<String, Json>,
}

impl ConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of configuration values
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        match serde_json::from_str(content)? {
            Json::Object(map) => Ok(Self {
                values: map.into_iter().collect(),
            }),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    /// Read a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Json>) {
        self.values.insert(key.into(), value.into());
    }

    /// Apply a `key=value` assignment; the value is read as JSON when it parses
    pub fn apply_override(&mut self, assignment: &str) -> Result<(), ConfigError> {
        let (key, raw) = assignment
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::InvalidOverride(assignment.to_string()))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.to_string()));
        self.set(key.trim(), value);
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Scalar value as text; empty strings count as unset
    fn text(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Json::String(s) if s.trim().is_empty() => None,
            Json::String(s) => Some(s.clone()),
            Json::Number(n) => Some(n.to_string()),
            Json::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.text(key)
            .ok_or_else(|| ConfigError::MissingKeys(vec![key.to_string()]))
    }

    fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    fn list(&self, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Json::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Json::String(s) => Ok(s.trim().to_string()),
                    _ => Err(ConfigError::invalid(key, "expected a list of strings")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(Json::String(s)) => Ok(Some(
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            )),
            Some(_) => Err(ConfigError::invalid(key, "expected a list of strings")),
        }
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.text(key).as_deref() {
            None | Some("false") => Ok(false),
            Some("true") => Ok(true),
            Some(other) => Err(ConfigError::invalid(
                key,
                format!("expected true or false, got '{}'", other),
            )),
        }
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.text(key)
            .map(|s| {
                s.parse::<T>()
                    .map_err(|_| {
                        ConfigError::invalid(key, format!("'{}' is not a valid number", s))
                    })
            })
            .transpose()
    }
}

/// A configuration value that must never be displayed
#[derive(Clone, PartialEq, Eq)]
pub struct Sensitive(String);

impl Sensitive {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Secret attribute value for a resource
    pub fn to_value(&self) -> Value {
        Value::secret(self.0.clone())
    }
}

impl fmt::Debug for Sensitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Validated configuration of the whole stack
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub region: String,
    pub db_name: String,
    pub db_username: String,
    pub db_password: Sensitive,
    pub app_port: u16,
    pub certificate_arn: String,
    pub ami: String,
    pub key_pair: String,
    pub domain: String,
    /// Zone id the configured zone lookup answers with
    pub hosted_zone: Option<String>,
    pub project: String,
    pub table_name: String,
    pub mailgun_api_key: Sensitive,
    pub vpc_cidr: String,
    pub zone_suffixes: Vec<String>,
    pub allow_http: bool,
    pub db_engine: String,
    pub db_instance_class: String,
    pub db_storage_type: String,
    pub db_allocated_storage: i64,
    pub instance_type: String,
    pub bucket_location: String,
    pub function_archive: String,
}

impl StackConfig {
    /// Validate a raw source; every missing required key is reported at once
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| source.text(key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys(missing));
        }

        let app_port = source
            .number::<u16>("appPort")?
            .filter(|port| *port > 0)
            .ok_or_else(|| ConfigError::invalid("appPort", "must be between 1 and 65535"))?;

        let db_allocated_storage = source.number::<i64>("dbAllocatedStorage")?.unwrap_or(20);
        if db_allocated_storage <= 0 {
            return Err(ConfigError::invalid("dbAllocatedStorage", "must be positive"));
        }

        let zone_suffixes = source.list("availabilityZones")?.unwrap_or_else(|| {
            DEFAULT_ZONE_SUFFIXES.iter().map(|s| s.to_string()).collect()
        });

        Ok(Self {
            region: source.require("region")?,
            db_name: source.require("name")?,
            db_username: source.require("username")?,
            db_password: Sensitive::new(source.require("password")?),
            app_port,
            certificate_arn: source.require("certificateArn")?,
            ami: source.require("ami")?,
            key_pair: source.require("keyPair")?,
            domain: source.require("domain")?,
            hosted_zone: source.text("hostedzone"),
            project: source.require("project")?,
            table_name: source.require("tableName")?,
            mailgun_api_key: Sensitive::new(source.require("mailgun_api_key")?),
            vpc_cidr: source.text_or("vpcCidr", DEFAULT_VPC_CIDR),
            zone_suffixes,
            allow_http: source.flag("allowHttp")?,
            db_engine: source.text_or("dbEngine", "postgres"),
            db_instance_class: source.text_or("dbInstanceClass", "db.t3.micro"),
            db_storage_type: source.text_or("dbStorageType", "gp2"),
            db_allocated_storage,
            instance_type: source.text_or("instanceType", "t2.micro"),
            bucket_location: source.text_or("bucketLocation", "us-central1"),
            function_archive: source.text_or("functionArchive", "./serverless.zip"),
        })
    }

    /// Availability zone names, `<region><suffix>`
    pub fn zone_names(&self) -> Vec<String> {
        self.zone_suffixes
            .iter()
            .map(|suffix| format!("{}{}", self.region, suffix))
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn test_source() -> ConfigSource {
    ConfigSource::new()
        .with("region", "us-east-1")
        .with("name", "csye6225")
        .with("username", "csye6225")
        .with("password", "s3cret-pass")
        .with("appPort", 8080)
        .with(
            "certificateArn",
            "arn:aws:acm:us-east-1:123456789012:certificate/abc",
        )
        .with("ami", "ami-0abcdef1234567890")
        .with("keyPair", "webapp-key")
        .with("domain", "demo.example.com")
        .with("hostedzone", "Z0123456789ABC")
        .with("project", "webapp-project")
        .with("tableName", "emails")
        .with("mailgun_api_key", "key-mailgun")
}

#[cfg(test)]
pub(crate) fn test_config() -> StackConfig {
    match StackConfig::from_source(&test_source()) {
        Ok(config) => config,
        Err(e) => panic!("test configuration is invalid: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let config = test_config();
        assert_eq!(config.vpc_cidr, "172.16.0.0/16");
        assert_eq!(config.zone_names(), vec!["us-east-1a", "us-east-1b", "us-east-1c"]);
        assert!(!config.allow_http);
        assert_eq!(config.db_engine, "postgres");
        assert_eq!(config.db_instance_class, "db.t3.micro");
        assert_eq!(config.db_allocated_storage, 20);
        assert_eq!(config.instance_type, "t2.micro");
        assert_eq!(config.function_archive, "./serverless.zip");
    }

    #[test]
    fn every_missing_key_is_listed() {
        let source = ConfigSource::new()
            .with("region", "us-east-1")
            .with("appPort", 8080)
            .with("domain", "");

        let keys = match StackConfig::from_source(&source) {
            Err(ConfigError::MissingKeys(keys)) => keys,
            other => panic!("expected MissingKeys, got {:?}", other),
        };
        assert_eq!(
            keys,
            vec![
                "name",
                "username",
                "password",
                "certificateArn",
                "ami",
                "keyPair",
                "domain",
                "project",
                "tableName",
                "mailgun_api_key",
            ]
        );
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut source = ConfigSource::from_json(r#"{"region": "us-west-2", "appPort": "3000"}"#)
            .unwrap();
        source.apply_override("region=us-east-1").unwrap();
        source.apply_override("allowHttp=true").unwrap();
        source.apply_override("availabilityZones=a, b, d").unwrap();

        let mut merged = test_source();
        for key in ["region", "allowHttp", "availabilityZones"] {
            merged.set(key, source.values[key].clone());
        }
        let config = StackConfig::from_source(&merged).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert!(config.allow_http);
        assert_eq!(config.zone_suffixes, vec!["a", "b", "d"]);
    }

    #[test]
    fn malformed_override_is_rejected() {
        let mut source = ConfigSource::new();
        assert!(matches!(
            source.apply_override("region"),
            Err(ConfigError::InvalidOverride(_))
        ));
        assert!(matches!(
            source.apply_override("=us-east-1"),
            Err(ConfigError::InvalidOverride(_))
        ));
    }

    #[test]
    fn port_must_be_numeric() {
        let source = test_source().with("appPort", "http");
        let err = StackConfig::from_source(&source).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for 'appPort': 'http' is not a valid number"
        );
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(matches!(
            ConfigSource::from_json("[1, 2]"),
            Err(ConfigError::NotAnObject)
        ));
    }

    #[test]
    fn secrets_are_not_debug_printed() {
        let config = test_config();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret-pass"));
        assert!(!debug.contains("key-mailgun"));
        assert_eq!(config.db_password.expose(), "s3cret-pass");
    }
}
