//! Service registry phase
//!
//! Runs after the object tree is built: every declared service gets a node
//! under `/services`, its transport is started against the subtree named by
//! its root path, and the resolved descriptor is published as the node's
//! value and merged into `/services/Description`.

use arbor_core::path;
use arbor_core::{
    build_objects, locate_registry, DescriptionGraph, NodeId, ResourceClass, ServiceDescriptor,
    ServiceScheme, Specification,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::coap::CoapService;
use crate::error::ServiceError;
use crate::http::HttpService;
use crate::mqtt::{self, DEFAULT_BROKER};
use crate::SharedTree;

/// Host-level settings applied to every service
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Host to bind when a service declares none
    pub bind_host: String,
    /// Broker executable for MQTT services
    pub broker_command: String,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            broker_command: DEFAULT_BROKER.to_string(),
        }
    }
}

/// Live transport behind a registry entry
pub enum Transport {
    Http(HttpService),
    Coap(CoapService),
}

impl Transport {
    pub fn base_address(&self) -> &str {
        match self {
            Self::Http(s) => s.base_address(),
            Self::Coap(s) => s.base_address(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        match self {
            Self::Http(s) => s.local_addr(),
            Self::Coap(s) => s.local_addr(),
        }
    }

    pub fn shutdown(&self) {
        match self {
            Self::Http(s) => s.shutdown(),
            Self::Coap(s) => s.shutdown(),
        }
    }
}

/// A registry entry and whatever transport was started for it
pub struct ServiceObject {
    pub name: String,
    pub node: NodeId,
    /// Descriptor with resolved host, port and address
    pub descriptor: ServiceDescriptor,
    pub transport: Option<Transport>,
}

/// All services created by [`instantiate_services`], in declaration order
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<ServiceObject>,
}

impl ServiceRegistry {
    pub fn get(&self, name: &str) -> Option<&ServiceObject> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceObject> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Stop every running transport
    pub fn shutdown(&self) {
        for service in &self.services {
            if let Some(transport) = &service.transport {
                transport.shutdown();
            }
        }
    }
}

/// Run both phases: build the object tree, then start its services
pub async fn build(
    spec: &Specification,
    options: &ServiceOptions,
) -> Result<(SharedTree, ServiceRegistry), ServiceError> {
    let tree: SharedTree = Arc::new(RwLock::new(build_objects(spec)?));
    let registry = instantiate_services(&tree, spec, options).await?;
    Ok((tree, registry))
}

/// Create the `/services` entries declared in `spec` and start their transports
///
/// Services are started one at a time, in declaration order. Any failure
/// aborts the phase.
pub async fn instantiate_services(
    tree: &SharedTree,
    spec: &Specification,
    options: &ServiceOptions,
) -> Result<ServiceRegistry, ServiceError> {
    let registry = locate_registry(&*tree.read().await)?;
    let mut services = Vec::with_capacity(spec.services.len());

    for (name, descriptor) in &spec.services {
        let service = create_service(tree, registry.node, name, descriptor.clone(), options).await?;

        let metadata = service.descriptor.metadata();
        let graph = DescriptionGraph::from_model(
            name,
            metadata.iter().map(|(k, v)| (k.as_str(), v.clone())),
        );
        tree.write().await.description_mut(registry.description).merge(graph);

        services.push(service);
    }

    info!(services = services.len(), "Service registry populated");
    Ok(ServiceRegistry { services })
}

/// Create one registry entry under `registry` and start its transport
pub async fn create_service(
    tree: &SharedTree,
    registry: NodeId,
    name: &str,
    mut descriptor: ServiceDescriptor,
    options: &ServiceOptions,
) -> Result<ServiceObject, ServiceError> {
    let (node, service_root) = {
        let mut guard = tree.write().await;
        let node = guard.create(
            registry,
            name,
            ResourceClass::Service(descriptor.scheme.clone()),
        )?;
        let service_root = path::resolve(&guard, &descriptor.root_path, guard.root()).map_err(
            |source| ServiceError::RootPath {
                service: name.to_string(),
                source,
            },
        )?;
        (node, service_root)
    };

    let host = if descriptor.host.is_empty() {
        options.bind_host.clone()
    } else {
        descriptor.host.clone()
    };

    let transport = match &descriptor.scheme {
        ServiceScheme::Http => Some(Transport::Http(
            HttpService::start(tree.clone(), service_root, &host, descriptor.port).await?,
        )),
        ServiceScheme::Coap => Some(Transport::Coap(
            CoapService::start(tree.clone(), service_root, &host, descriptor.port).await?,
        )),
        ServiceScheme::Mqtt => {
            mqtt::launch_broker(&options.broker_command, descriptor.port).await?;
            None
        }
        ServiceScheme::Other(scheme) => {
            warn!(service = %name, scheme = %scheme, "No transport for scheme; registering only");
            None
        }
    };

    if let Some(transport) = &transport {
        record_bound_address(&mut descriptor, transport);
    }

    tree.write().await.set_value(node, descriptor.to_value());
    info!(
        service = %name,
        scheme = %descriptor.scheme,
        host = %descriptor.host,
        port = descriptor.port,
        "Registered service"
    );

    Ok(ServiceObject {
        name: name.to_string(),
        node,
        descriptor,
        transport,
    })
}

/// Write the host (and an ephemeral port) read back from a started transport
fn record_bound_address(descriptor: &mut ServiceDescriptor, transport: &Transport) {
    if let Some(host) = Url::parse(transport.base_address())
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
    {
        descriptor.host = host;
    }
    if descriptor.port == 0 {
        descriptor.port = transport.local_addr().port();
    }
    if descriptor.address.is_empty() {
        if let Some(ip) = crate::net::local_ipv4() {
            descriptor.address = ip.to_string();
        }
    }
}
