//! Resource classes and the default-children table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scheme of a declared service entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceScheme {
    Http,
    Coap,
    Mqtt,
    /// Any other scheme; gets a registry entry but no transport
    Other(String),
}

impl ServiceScheme {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Http => "http",
            Self::Coap => "coap",
            Self::Mqtt => "mqtt",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ServiceScheme {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "http" => Self::Http,
            "coap" => Self::Coap,
            "mqtt" => Self::Mqtt,
            _ => Self::Other(s),
        }
    }
}

impl From<ServiceScheme> for String {
    fn from(s: ServiceScheme) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for ServiceScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class tag of a resource tree node
///
/// Class strings from a specification are matched by value. Classes the
/// builder has no behavior for are carried as [`ResourceClass::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceClass {
    /// Generic container (LWM2M object or instance)
    SmartObject,
    /// Leaf resource that can be read, set and observed
    ObservableProperty,
    Description,
    Agent,
    Observers,
    /// `.well-known/core` discovery endpoint
    LinkFormatProxy,
    HttpPublisher,
    HttpSubscriber,
    CoapPublisher,
    CoapSubscriber,
    MqttObserver,
    CallbackNotifier,
    /// Service registry entry, tagged with its scheme
    Service(ServiceScheme),
    Other(String),
}

const SMART_OBJECT_DEFAULTS: &[ResourceClass] =
    &[ResourceClass::Description, ResourceClass::Agent];
const OBSERVABLE_PROPERTY_DEFAULTS: &[ResourceClass] =
    &[ResourceClass::Description, ResourceClass::Observers];

impl ResourceClass {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SmartObject => "SmartObject",
            Self::ObservableProperty => "ObservableProperty",
            Self::Description => "Description",
            Self::Agent => "Agent",
            Self::Observers => "Observers",
            Self::LinkFormatProxy => "LinkFormatProxy",
            Self::HttpPublisher => "httpPublisher",
            Self::HttpSubscriber => "httpSubscriber",
            Self::CoapPublisher => "coapPublisher",
            Self::CoapSubscriber => "coapSubscriber",
            Self::MqttObserver => "mqttObserver",
            Self::CallbackNotifier => "callbackNotifier",
            Self::Service(scheme) => scheme.as_str(),
            Self::Other(s) => s,
        }
    }

    /// Children created once, in this order, under every node of this class
    pub fn default_children(&self) -> &'static [ResourceClass] {
        match self {
            Self::SmartObject => SMART_OBJECT_DEFAULTS,
            Self::ObservableProperty => OBSERVABLE_PROPERTY_DEFAULTS,
            _ => &[],
        }
    }
}

impl FromStr for ResourceClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "SmartObject" => Self::SmartObject,
            "ObservableProperty" => Self::ObservableProperty,
            "Description" => Self::Description,
            "Agent" => Self::Agent,
            "Observers" => Self::Observers,
            "LinkFormatProxy" => Self::LinkFormatProxy,
            "httpPublisher" => Self::HttpPublisher,
            "httpSubscriber" => Self::HttpSubscriber,
            "coapPublisher" => Self::CoapPublisher,
            "coapSubscriber" => Self::CoapSubscriber,
            "mqttObserver" => Self::MqttObserver,
            "callbackNotifier" => Self::CallbackNotifier,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<String> for ResourceClass {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(class) => class,
            Err(never) => match never {},
        }
    }
}

impl From<ResourceClass> for String {
    fn from(c: ResourceClass) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_string_round_trip() {
        for name in ["SmartObject", "ObservableProperty", "mqttObserver", "LinkFormatProxy"] {
            let class: ResourceClass = name.parse().unwrap();
            assert_eq!(class.as_str(), name);
            assert!(!matches!(class, ResourceClass::Other(_)));
        }
    }

    #[test]
    fn test_unknown_class_is_other() {
        let class = ResourceClass::from("BLE_ColorLED_handler".to_string());
        assert_eq!(class, ResourceClass::Other("BLE_ColorLED_handler".to_string()));
        assert!(class.default_children().is_empty());
    }

    #[test]
    fn test_default_children_table() {
        assert_eq!(
            ResourceClass::SmartObject.default_children(),
            &[ResourceClass::Description, ResourceClass::Agent]
        );
        assert_eq!(
            ResourceClass::ObservableProperty.default_children(),
            &[ResourceClass::Description, ResourceClass::Observers]
        );
        assert!(ResourceClass::Agent.default_children().is_empty());
    }

    #[test]
    fn test_service_scheme_parsing() {
        assert_eq!(ServiceScheme::from("HTTP".to_string()), ServiceScheme::Http);
        assert_eq!(ServiceScheme::from("ftp".to_string()), ServiceScheme::Other("ftp".into()));
        assert_eq!(ResourceClass::Service(ServiceScheme::Coap).as_str(), "coap");
    }
}
