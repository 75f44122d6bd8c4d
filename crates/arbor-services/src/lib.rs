//! Arbor services - transports and the service registry
//!
//! Once the object tree is built it is shared behind a [`SharedTree`] and
//! [`instantiate_services`] starts one transport per declared service:
//! HTTP and CoAP serve a subtree, MQTT launches an external broker.

pub mod coap;
pub mod error;
pub mod http;
pub mod mqtt;
pub mod net;
pub mod registry;
pub mod resource;

use arbor_core::ResourceTree;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Resource tree shared between the registry and running transports
pub type SharedTree = Arc<RwLock<ResourceTree>>;

pub use coap::CoapService;
pub use error::ServiceError;
pub use http::HttpService;
pub use registry::{
    build, create_service, instantiate_services, ServiceObject, ServiceOptions, ServiceRegistry,
    Transport,
};
