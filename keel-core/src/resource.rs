//! Resource - Representing resources, deferred values and their state

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

/// Internal attribute carrying the component that derived a resource
pub const COMPONENT_ATTRIBUTE: &str = "_component";

/// Placeholder displayed in place of sensitive material
pub const REDACTED: &str = "(sensitive)";

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    /// Resource type (e.g., "aws.vpc", "gcp.storage.bucket")
    pub resource_type: String,
    /// Logical resource name, unique within a stack
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
///
/// Besides plain data, a value can be *deferred*: it refers to attributes
/// that only exist once another resource has been materialized. Deferred
/// values are resolved by the interpreter, never at authoring time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to another resource's attribute (resource_name, attribute_name)
    ResourceRef(String, String),
    /// Concatenation of parts, rendered once every part has resolved
    Interpolate(Vec<Value>),
    /// Base64 encoding of the rendered inner value
    Base64(Box<Value>),
    /// JSON document rendered from the inner value
    Json(Box<Value>),
    /// Sensitive value, redacted whenever displayed or exported
    Secret(Box<Value>),
}

/// A deferred reference whose owner never produced the attribute
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unresolved reference {resource}.{attribute}")]
pub struct UnresolvedRef {
    pub resource: String,
    pub attribute: String,
}

impl Value {
    /// Reference to `resource.attribute`
    pub fn reference(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::ResourceRef(resource.into(), attribute.into())
    }

    /// Mark a value as sensitive
    pub fn secret(value: impl Into<Value>) -> Self {
        Value::Secret(Box::new(value.into()))
    }

    /// List of plain strings
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Build a map value from key/value pairs
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Secret(inner) => inner.as_str(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Every `(resource, attribute)` pair this value depends on
    pub fn references(&self) -> Vec<(String, String)> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, refs: &mut Vec<(String, String)>) {
        match self {
            Value::ResourceRef(resource, attribute) => {
                refs.push((resource.clone(), attribute.clone()));
            }
            Value::List(items) | Value::Interpolate(items) => {
                for item in items {
                    item.collect_references(refs);
                }
            }
            Value::Map(map) => {
                for v in map.values() {
                    v.collect_references(refs);
                }
            }
            Value::Base64(inner) | Value::Json(inner) | Value::Secret(inner) => {
                inner.collect_references(refs);
            }
            Value::String(_) | Value::Int(_) | Value::Bool(_) => {}
        }
    }

    /// Returns true if the value cannot be known before materialization
    pub fn is_deferred(&self) -> bool {
        match self {
            Value::ResourceRef(..) => true,
            Value::List(items) | Value::Interpolate(items) => items.iter().any(Value::is_deferred),
            Value::Map(map) => map.values().any(Value::is_deferred),
            Value::Base64(inner) | Value::Json(inner) | Value::Secret(inner) => {
                inner.is_deferred()
            }
            Value::String(_) | Value::Int(_) | Value::Bool(_) => false,
        }
    }

    /// Returns true if the value contains sensitive material anywhere
    pub fn is_sensitive(&self) -> bool {
        match self {
            Value::Secret(_) => true,
            Value::List(items) | Value::Interpolate(items) => items.iter().any(Value::is_sensitive),
            Value::Map(map) => map.values().any(Value::is_sensitive),
            Value::Base64(inner) | Value::Json(inner) => inner.is_sensitive(),
            _ => false,
        }
    }

    /// Strip the outer secret marker
    pub fn expose(&self) -> &Value {
        match self {
            Value::Secret(inner) => inner.expose(),
            other => other,
        }
    }

    /// Resolve every deferred part of this value
    ///
    /// `lookup` returns the materialized value of `resource.attribute`.
    /// Rendering steps (interpolation, base64, JSON) run only after all of
    /// their inputs have resolved; a single missing input fails the whole
    /// value. Rendered output that embeds a secret stays a secret.
    pub fn resolve<F>(&self, lookup: &F) -> Result<Value, UnresolvedRef>
    where
        F: Fn(&str, &str) -> Option<Value>,
    {
        match self {
            Value::String(_) | Value::Int(_) | Value::Bool(_) => Ok(self.clone()),
            Value::List(items) => items
                .iter()
                .map(|v| v.resolve(lookup))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Value::Map(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), v.resolve(lookup)?)))
                .collect::<Result<HashMap<_, _>, UnresolvedRef>>()
                .map(Value::Map),
            Value::ResourceRef(resource, attribute) => {
                lookup(resource, attribute).ok_or_else(|| UnresolvedRef {
                    resource: resource.clone(),
                    attribute: attribute.clone(),
                })
            }
            Value::Interpolate(parts) => {
                let mut rendered = String::new();
                let mut sensitive = false;
                for part in parts {
                    let resolved = part.resolve(lookup)?;
                    sensitive |= resolved.is_sensitive();
                    rendered.push_str(&resolved.plain_text());
                }
                Ok(seal(sensitive, Value::String(rendered)))
            }
            Value::Base64(inner) => {
                let resolved = inner.resolve(lookup)?;
                let encoded = general_purpose::STANDARD.encode(resolved.plain_text());
                Ok(seal(resolved.is_sensitive(), Value::String(encoded)))
            }
            Value::Json(inner) => {
                let resolved = inner.resolve(lookup)?;
                let document = resolved.json(false).to_string();
                Ok(seal(resolved.is_sensitive(), Value::String(document)))
            }
            Value::Secret(inner) => Ok(Value::secret(inner.resolve(lookup)?.expose().clone())),
        }
    }

    /// Text form of a resolved value, secrets included
    fn plain_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Secret(inner) => inner.plain_text(),
            Value::List(_) | Value::Map(_) => self.json(false).to_string(),
            other => other.to_string(),
        }
    }

    /// JSON form with secrets redacted and references shown as `${name.attr}`
    pub fn to_json(&self) -> serde_json::Value {
        self.json(true)
    }

    fn json(&self, redact: bool) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.json(redact)).collect())
            }
            Value::Map(map) => {
                let obj: serde_json::Map<_, _> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.json(redact)))
                    .collect();
                serde_json::Value::Object(obj)
            }
            Value::Secret(_) if redact => serde_json::Value::String(REDACTED.to_string()),
            Value::Secret(inner) => inner.json(redact),
            other => serde_json::Value::String(other.to_string()),
        }
    }

    /// Convert a JSON value back into a plain value
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::String(n.to_string()),
            },
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
            serde_json::Value::Null => Value::String(String::new()),
        }
    }
}

fn seal(sensitive: bool, value: Value) -> Value {
    if sensitive {
        Value::secret(value)
    } else {
        value
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                let strs: Vec<_> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", strs.join(", "))
            }
            Value::Map(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                let strs: Vec<_> = keys
                    .into_iter()
                    .map(|k| format!("{}: {}", k, map[k]))
                    .collect();
                write!(f, "{{{}}}", strs.join(", "))
            }
            Value::ResourceRef(resource, attr) => write!(f, "{}.{}", resource, attr),
            Value::Interpolate(parts) => {
                write!(f, "`")?;
                for part in parts {
                    match part {
                        Value::String(s) => write!(f, "{}", s)?,
                        other => write!(f, "${{{}}}", other)?,
                    }
                }
                write!(f, "`")
            }
            Value::Base64(inner) => write!(f, "base64({})", inner),
            Value::Json(inner) => write!(f, "json({})", inner),
            Value::Secret(_) => write!(f, "{}", REDACTED),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Desired state of a single resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// Ordering-only dependencies (resource names) that carry no value
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn with_component(self, component: &str) -> Self {
        self.with_attribute(COMPONENT_ATTRIBUTE, component)
    }

    /// Deferred reference to one of this resource's attributes
    pub fn output(&self, attribute: &str) -> Value {
        Value::reference(self.id.name.clone(), attribute)
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Component that derived this resource, if tagged
    pub fn component(&self) -> Option<&str> {
        self.attributes.get(COMPONENT_ATTRIBUTE).and_then(Value::as_str)
    }

    /// Attributes sent to a provider (internal `_` attributes excluded)
    pub fn public_attributes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter().filter(|(k, _)| !k.starts_with('_'))
    }

    /// Names of every resource this one depends on
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps: BTreeSet<String> = self
            .attributes
            .values()
            .flat_map(Value::references)
            .map(|(resource, _)| resource)
            .collect();
        deps.extend(self.depends_on.iter().cloned());
        deps.remove(&self.id.name);
        deps
    }
}

/// State of a materialized resource, as reported by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider-side identifier (e.g., vpc-xxx, arn:aws:sns:...)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Read back an attribute; `id` falls back to the provider identifier
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match self.attributes.get(name) {
            Some(value) => Some(value.clone()),
            None if name == "id" => self.identifier.clone().map(Value::String),
            None => None,
        }
    }
}
