//! Resource tree construction from a specification
//!
//! The object phase materializes every declared resource in dependency-safe
//! order, attaches each class's default children, fills Description graphs
//! and binds declared observation relations. The service phase (in
//! `arbor-services`) then runs against the `/services` registry located by
//! [`locate_registry`].

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::class::ResourceClass;
use crate::graph::DescriptionGraph;
use crate::link_format::{CORE, WELL_KNOWN};
use crate::observer;
use crate::path::{self, PathError};
use crate::spec::{ResourceDescriptor, Specification};
use crate::tree::{NodeId, ResourceTree, TreeError, ROOT_NAME};

/// Path of the service registry container
pub const SERVICES_PATH: &str = "/services";
/// Path of the shared services description
pub const SERVICES_DESCRIPTION_PATH: &str = "/services/Description";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{path} requires a root resource, but none was declared at \"/\"")]
    MissingRoot { path: String },
    #[error("Root resource must be a single SmartObject, found {0}")]
    InvalidRoot(ResourceClass),
    #[error("Parent of {path} does not exist: {source}")]
    MissingParent {
        path: String,
        #[source]
        source: PathError,
    },
    #[error("Service registry is incomplete: {0}")]
    MissingRegistry(#[source] PathError),
    #[error(transparent)]
    DuplicateName(#[from] TreeError),
}

/// The `/services` container and its shared Description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registry {
    pub node: NodeId,
    pub description: NodeId,
}

/// Order in which declared paths are created
///
/// Sorted by depth (separator count), then by length, then by declaration
/// order, so every parent path precedes its children.
pub fn build_order(spec: &Specification) -> Vec<&str> {
    let mut paths: Vec<&str> = spec.objects.keys().map(String::as_str).collect();
    paths.sort_by_key(|p| (path::depth(p), p.len()));
    paths
}

/// Build the object tree declared in `spec`
pub fn build_objects(spec: &Specification) -> Result<ResourceTree, BuildError> {
    let mut tree: Option<ResourceTree> = None;

    for path in build_order(spec) {
        let descriptor = &spec.objects[path];

        let (tree, node) = if path == ROOT_NAME {
            if tree.is_some() || descriptor.resource_class != ResourceClass::SmartObject {
                return Err(BuildError::InvalidRoot(descriptor.resource_class.clone()));
            }
            let root_tree = tree.insert(ResourceTree::new(ResourceClass::SmartObject));
            let root = root_tree.root();
            if let Some(value) = descriptor.scalar_fields() {
                root_tree.set_value(root, value);
            }
            (root_tree, root)
        } else {
            let tree = tree.as_mut().ok_or_else(|| BuildError::MissingRoot {
                path: path.to_string(),
            })?;
            let node = create_resource(tree, path, descriptor)?;
            (tree, node)
        };

        attach_default_children(tree, node, path, descriptor)?;
        bind_relations(tree, node, path, descriptor);
        debug!(path = %path, class = %descriptor.resource_class, "Created resource");
    }

    let tree = tree.ok_or_else(|| BuildError::MissingRoot {
        path: ROOT_NAME.to_string(),
    })?;
    info!(
        declared = spec.objects.len(),
        nodes = tree.len(),
        "Built resource tree"
    );
    Ok(tree)
}

/// Create the node for `path` under its (already built) parent
fn create_resource(
    tree: &mut ResourceTree,
    path: &str,
    descriptor: &ResourceDescriptor,
) -> Result<NodeId, BuildError> {
    let parent = path::resolve(tree, path::parent_path(path), tree.root()).map_err(|source| {
        BuildError::MissingParent {
            path: path.to_string(),
            source,
        }
    })?;

    // Paths address nodes, so the final segment names the node
    let name = path::segments(path).last().unwrap_or(path);
    if name != descriptor.resource_name {
        warn!(
            path = %path,
            name = %descriptor.resource_name,
            "Resource name differs from its path segment; node is named by the path"
        );
    }

    let node = tree.create(parent, name, descriptor.resource_class.clone())?;
    if let Some(value) = descriptor.scalar_fields() {
        tree.set_value(node, value);
    }
    Ok(node)
}

fn attach_default_children(
    tree: &mut ResourceTree,
    node: NodeId,
    path: &str,
    descriptor: &ResourceDescriptor,
) -> Result<(), BuildError> {
    for class in descriptor.resource_class.default_children() {
        let child = tree.create(node, class.as_str(), class.clone())?;

        if *class == ResourceClass::Description {
            tree.set_description(child, DescriptionGraph::from_model(path, descriptor.metadata()));
            let well_known = tree.create(node, WELL_KNOWN, ResourceClass::Agent)?;
            tree.create(well_known, CORE, ResourceClass::LinkFormatProxy)?;
        }
    }
    Ok(())
}

/// Bind every declared endpoint; failures are reported and skipped
fn bind_relations(
    tree: &mut ResourceTree,
    node: NodeId,
    path: &str,
    descriptor: &ResourceDescriptor,
) {
    for (kind, uris) in descriptor.relations() {
        for uri in uris {
            match observer::bind(tree, node, kind, uri) {
                Ok(binding) => debug!(
                    path = %path,
                    relation = %kind,
                    uri = %uri,
                    binding = %tree.node(binding).name(),
                    "Bound observer"
                ),
                Err(e) => warn!(
                    path = %path,
                    relation = %kind,
                    uri = %uri,
                    error = %e,
                    "Skipping observer binding"
                ),
            }
        }
    }
}

/// Find `/services` and `/services/Description` in a built tree
pub fn locate_registry(tree: &ResourceTree) -> Result<Registry, BuildError> {
    let node =
        path::resolve(tree, SERVICES_PATH, tree.root()).map_err(BuildError::MissingRegistry)?;
    let description = path::resolve(tree, SERVICES_DESCRIPTION_PATH, tree.root())
        .map_err(BuildError::MissingRegistry)?;
    Ok(Registry { node, description })
}
