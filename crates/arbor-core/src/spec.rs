//! System specification: the declarative input to a build
//!
//! A specification is a JSON document with four sections:
//! - `service_metadata`: free-form description of the hosting environment
//! - `services`: named transport services bound to subtrees
//! - `object_metadata`: free-form, currently unused
//! - `objects`: resource descriptors keyed by absolute path

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::class::{ResourceClass, ServiceScheme};

#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Failed to read specification: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse specification: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Complete system specification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Specification {
    #[serde(default)]
    pub service_metadata: IndexMap<String, Value>,
    #[serde(default)]
    pub services: IndexMap<String, ServiceDescriptor>,
    #[serde(default)]
    pub object_metadata: IndexMap<String, Value>,
    #[serde(default)]
    pub objects: IndexMap<String, ResourceDescriptor>,
}

impl Specification {
    /// Parse a specification from a JSON string
    pub fn from_json(content: &str) -> Result<Self, SpecError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a specification from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, SpecError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// Kind of observation relationship declared on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Subscribe,
    Publish,
    Bridge,
    Handle,
}

impl RelationKind {
    pub const ALL: [RelationKind; 4] = [
        RelationKind::Subscribe,
        RelationKind::Publish,
        RelationKind::Bridge,
        RelationKind::Handle,
    ];

    /// Descriptor field holding endpoint URIs for this relation
    pub fn key(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribesTo",
            Self::Publish => "publishesTo",
            Self::Bridge => "bridgesTo",
            Self::Handle => "handledBy",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Declarative description of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(rename = "resourceName")]
    pub resource_name: String,
    #[serde(rename = "resourceClass")]
    pub resource_class: ResourceClass,
    /// Class-specific fields, observation relations included
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>, class: ResourceClass) -> Self {
        Self {
            resource_name: name.into(),
            resource_class: class,
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// All descriptor entries as predicate/value pairs, in declaration order
    pub fn metadata(&self) -> impl Iterator<Item = (&str, Value)> {
        [
            ("resourceName", Value::String(self.resource_name.clone())),
            ("resourceClass", Value::String(self.resource_class.to_string())),
        ]
        .into_iter()
        .chain(self.fields.iter().map(|(k, v)| (k.as_str(), v.clone())))
    }

    /// Non-relation fields as a JSON object, `None` when there are none
    pub fn scalar_fields(&self) -> Option<Value> {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .filter(|(k, _)| RelationKind::from_key(k).is_none())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if map.is_empty() {
            None
        } else {
            Some(Value::Object(map))
        }
    }

    /// Observation relations in field order, each with its endpoint URIs
    ///
    /// A bare string is accepted as a one-element list. Entries that are not
    /// strings are dropped with a warning.
    pub fn relations(&self) -> Vec<(RelationKind, Vec<&str>)> {
        self.fields
            .iter()
            .filter_map(|(key, value)| {
                let kind = RelationKind::from_key(key)?;
                let uris = match value {
                    Value::String(s) => vec![s.as_str()],
                    Value::Array(items) => items
                        .iter()
                        .filter_map(|item| match item.as_str() {
                            Some(s) => Some(s),
                            None => {
                                warn!(
                                    resource = %self.resource_name,
                                    relation = %kind,
                                    entry = %item,
                                    "Ignoring non-string endpoint URI"
                                );
                                None
                            }
                        })
                        .collect(),
                    other => {
                        warn!(
                            resource = %self.resource_name,
                            relation = %kind,
                            value = %other,
                            "Relation field is not a list of URIs"
                        );
                        Vec::new()
                    }
                };
                Some((kind, uris))
            })
            .collect()
    }
}

fn default_path() -> String {
    "/".to_string()
}

/// Declared transport service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub scheme: ServiceScheme,
    /// Host name; rewritten with the bound host once the service starts
    #[serde(default, alias = "FQDN")]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    /// IPv4 address of the host, discovered when empty
    #[serde(default, alias = "IPV4")]
    pub address: String,
    /// Path of the subtree this service exposes
    #[serde(default = "default_path", alias = "root")]
    pub root_path: String,
    #[serde(default = "default_path", alias = "discovery")]
    pub discovery_path: String,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ServiceDescriptor {
    pub fn new(scheme: ServiceScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            address: String::new(),
            root_path: default_path(),
            discovery_path: default_path(),
            extra: IndexMap::new(),
        }
    }

    /// Descriptor as a JSON object
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Descriptor fields as predicate/value pairs
    pub fn metadata(&self) -> Vec<(String, Value)> {
        match self.to_value() {
            Value::Object(map) => map.into_iter().collect(),
            _ => Vec::new(),
        }
    }
}
