//! Observer bindings: endpoint URIs resolved into protocol binding resources
//!
//! Each (scheme, relation) pair maps to one binding template. Templates carry
//! fixed defaults and are filled from the URI by a pure constructor; the
//! result is attached under the owning resource's `Observers` container.

use percent_encoding::percent_decode_str;
use serde::Serialize;
use thiserror::Error;
use url::{Position, Url};

use crate::class::ResourceClass;
use crate::spec::RelationKind;
use crate::tree::{NodeId, ResourceTree, TreeError};

pub const DEFAULT_MQTT_CONNECTION: &str = "localhost";
pub const DEFAULT_MQTT_KEEP_ALIVE: u32 = 60;
pub const DEFAULT_MQTT_QOS: u8 = 0;
pub const DEFAULT_HTTP_USERNAME: &str = "admin";
pub const DEFAULT_HTTP_PASSWORD: &str = "secret";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("Invalid endpoint URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("Unknown endpoint scheme {0:?}")]
    UnknownScheme(String),
    #[error("Scheme {scheme:?} does not support {kind}")]
    Unsupported { scheme: String, kind: RelationKind },
    #[error("Resource {0} has no Observers container")]
    NoObservers(String),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Resolved binding for one endpoint URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Binding {
    HttpPublisher {
        #[serde(rename = "targetURI")]
        target_uri: String,
        username: String,
        password: String,
    },
    HttpSubscriber {
        #[serde(rename = "observerURI")]
        observer_uri: String,
    },
    CoapPublisher {
        #[serde(rename = "targetURI")]
        target_uri: String,
    },
    CoapSubscriber {
        #[serde(rename = "observerURI")]
        observer_uri: String,
    },
    MqttObserver {
        connection: String,
        #[serde(rename = "pubTopic")]
        pub_topic: String,
        #[serde(rename = "subTopic")]
        sub_topic: String,
        #[serde(rename = "keepAlive")]
        keep_alive: u32,
        #[serde(rename = "QoS")]
        qos: u8,
    },
    CallbackNotifier {
        #[serde(rename = "handlerURI")]
        handler_uri: String,
    },
}

impl Binding {
    /// Build the binding for a relation kind and endpoint URI
    pub fn for_endpoint(kind: RelationKind, uri: &str) -> Result<Self, BindError> {
        let parsed = Url::parse(uri).map_err(|e| BindError::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        let unsupported = || BindError::Unsupported {
            scheme: parsed.scheme().to_string(),
            kind,
        };

        match (parsed.scheme(), kind) {
            ("http", RelationKind::Publish) => Ok(Self::HttpPublisher {
                target_uri: uri.to_string(),
                username: DEFAULT_HTTP_USERNAME.to_string(),
                password: DEFAULT_HTTP_PASSWORD.to_string(),
            }),
            ("http", RelationKind::Subscribe) => Ok(Self::HttpSubscriber {
                observer_uri: uri.to_string(),
            }),
            ("coap", RelationKind::Publish) => Ok(Self::CoapPublisher {
                target_uri: uri.to_string(),
            }),
            ("coap", RelationKind::Subscribe) => Ok(Self::CoapSubscriber {
                observer_uri: uri.to_string(),
            }),
            ("mqtt", RelationKind::Handle) => Err(unsupported()),
            ("mqtt", _) => {
                let topic = decoded_path(&parsed);
                let (pub_topic, sub_topic) = match kind {
                    RelationKind::Publish => (topic, String::new()),
                    RelationKind::Subscribe => (String::new(), topic),
                    _ => (topic.clone(), topic),
                };
                Ok(Self::MqttObserver {
                    connection: authority(&parsed),
                    pub_topic,
                    sub_topic,
                    keep_alive: DEFAULT_MQTT_KEEP_ALIVE,
                    qos: DEFAULT_MQTT_QOS,
                })
            }
            ("handler", _) => Ok(Self::CallbackNotifier {
                handler_uri: uri.to_string(),
            }),
            ("http" | "coap", _) => Err(unsupported()),
            (scheme, _) => Err(BindError::UnknownScheme(scheme.to_string())),
        }
    }

    pub fn class(&self) -> ResourceClass {
        match self {
            Self::HttpPublisher { .. } => ResourceClass::HttpPublisher,
            Self::HttpSubscriber { .. } => ResourceClass::HttpSubscriber,
            Self::CoapPublisher { .. } => ResourceClass::CoapPublisher,
            Self::CoapSubscriber { .. } => ResourceClass::CoapSubscriber,
            Self::MqttObserver { .. } => ResourceClass::MqttObserver,
            Self::CallbackNotifier { .. } => ResourceClass::CallbackNotifier,
        }
    }

    /// Template fields as the binding node's value
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// `userinfo@host:port` part of a URI, without the scheme or path
fn authority(url: &Url) -> String {
    match &url[Position::BeforeUsername..Position::AfterPort] {
        "" => DEFAULT_MQTT_CONNECTION.to_string(),
        authority => authority.to_string(),
    }
}

/// URI path as the UTF-8 topic it was written as
fn decoded_path(url: &Url) -> String {
    percent_decode_str(url.path()).decode_utf8_lossy().into_owned()
}

/// Resolve `uri` and attach the binding under `resource`'s `Observers` container
pub fn bind(
    tree: &mut ResourceTree,
    resource: NodeId,
    kind: RelationKind,
    uri: &str,
) -> Result<NodeId, BindError> {
    let observers = tree
        .child(resource, ResourceClass::Observers.as_str())
        .ok_or_else(|| BindError::NoObservers(tree.path_of(resource)))?;
    let binding = Binding::for_endpoint(kind, uri)?;

    let class = binding.class();
    let name = unique_name(tree, observers, class.as_str());
    let node = tree.create(observers, &name, class)?;
    tree.set_value(node, binding.to_value());
    Ok(node)
}

/// `base`, or `base2`, `base3`, ... for the first name not taken under `parent`
fn unique_name(tree: &ResourceTree, parent: NodeId, base: &str) -> String {
    if tree.child(parent, base).is_none() {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}{}", base, n))
        .find(|name| tree.child(parent, name).is_none())
        .unwrap_or_else(|| base.to_string())
}
