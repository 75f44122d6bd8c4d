//! Resource representations shared by the HTTP and CoAP services

use arbor_core::link_format;
use arbor_core::path::{self, PathError};
use arbor_core::{DescriptionGraph, NodeId, ResourceClass, ResourceTree};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error(transparent)]
    NotFound(#[from] PathError),
    #[error("{0} is read-only")]
    ReadOnly(String),
}

/// JSON view of a single node
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub name: String,
    pub class: String,
    pub value: Option<Value>,
    pub children: Vec<String>,
}

impl NodeView {
    fn new(tree: &ResourceTree, id: NodeId) -> Self {
        let node = tree.node(id);
        Self {
            name: node.name().to_string(),
            class: node.class().to_string(),
            value: node.value().cloned(),
            children: node.child_names().map(str::to_string).collect(),
        }
    }
}

/// What a read of a path returns
#[derive(Debug, Clone)]
pub enum Representation {
    Node(NodeView),
    Description(DescriptionGraph),
    /// Link-format discovery document
    Links(String),
}

/// Read the resource at `path`, relative to the service root
pub fn represent(
    tree: &ResourceTree,
    service_root: NodeId,
    path: &str,
) -> Result<Representation, PathError> {
    let id = path::resolve(tree, path, service_root)?;
    let node = tree.node(id);

    Ok(match node.class() {
        ResourceClass::LinkFormatProxy => {
            // The proxy lives at <owner>/.well-known/core; an owner above
            // the service root is clamped to it
            let segments: Vec<&str> = path::segments(path).collect();
            let owner = if segments.len() >= 2 {
                node.parent()
                    .and_then(|wk| tree.node(wk).parent())
                    .unwrap_or(service_root)
            } else {
                service_root
            };
            let prefix = segments[..segments.len().saturating_sub(2)].join("/");
            let links = if prefix.is_empty() {
                link_format::render(tree, owner)
            } else {
                link_format::render_with_prefix(tree, owner, &format!("/{}", prefix))
            };
            Representation::Links(links)
        }
        ResourceClass::Description => {
            Representation::Description(node.description().cloned().unwrap_or_default())
        }
        _ => Representation::Node(NodeView::new(tree, id)),
    })
}

/// Replace the value of the resource at `path`
pub fn update(
    tree: &mut ResourceTree,
    service_root: NodeId,
    path: &str,
    value: Value,
) -> Result<(), WriteError> {
    let id = path::resolve(tree, path, service_root)?;
    match tree.node(id).class() {
        ResourceClass::LinkFormatProxy | ResourceClass::Description => {
            Err(WriteError::ReadOnly(tree.path_of(id)))
        }
        _ => {
            tree.set_value(id, value);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{build_objects, ResourceDescriptor, Specification};
    use serde_json::json;

    fn sample_tree() -> ResourceTree {
        let mut spec = Specification::default();
        for (path, descriptor) in [
            ("/", ResourceDescriptor::new("/", ResourceClass::SmartObject)),
            ("/11101", ResourceDescriptor::new("11101", ResourceClass::SmartObject)),
            (
                "/11101/5001",
                ResourceDescriptor::new("5001", ResourceClass::ObservableProperty)
                    .with_field("resourceType", json!("CapsuleID")),
            ),
        ] {
            spec.objects.insert(path.to_string(), descriptor);
        }
        build_objects(&spec).unwrap()
    }

    #[test]
    fn test_represent_node() {
        let tree = sample_tree();
        match represent(&tree, tree.root(), "/11101/5001").unwrap() {
            Representation::Node(view) => {
                assert_eq!(view.name, "5001");
                assert_eq!(view.class, "ObservableProperty");
                assert_eq!(view.value, Some(json!({"resourceType": "CapsuleID"})));
                assert_eq!(view.children, vec!["Description", ".well-known", "Observers"]);
            }
            other => panic!("unexpected representation: {:?}", other),
        }
    }

    #[test]
    fn test_represent_description() {
        let tree = sample_tree();
        match represent(&tree, tree.root(), "/11101/5001/Description").unwrap() {
            Representation::Description(graph) => {
                assert_eq!(graph.get("/11101/5001", "resourceType"), Some(&json!("CapsuleID")));
            }
            other => panic!("unexpected representation: {:?}", other),
        }
    }

    #[test]
    fn test_represent_nested_discovery() {
        let tree = sample_tree();
        match represent(&tree, tree.root(), "/11101/.well-known/core").unwrap() {
            Representation::Links(doc) => {
                assert!(doc.starts_with("</11101/Description>;ct=50"));
                assert!(doc.contains("</11101/5001>;rt=\"CapsuleID\";ct=50"));
                assert!(!doc.contains(".well-known"));
            }
            other => panic!("unexpected representation: {:?}", other),
        }
    }

    #[test]
    fn test_discovery_stays_inside_service_root() {
        let tree = sample_tree();
        let well_known = path::resolve(&tree, "/11101/.well-known", tree.root()).unwrap();
        match represent(&tree, well_known, "/core").unwrap() {
            Representation::Links(doc) => assert_eq!(doc, "</core>;ct=50"),
            other => panic!("unexpected representation: {:?}", other),
        }

        let core = path::resolve(&tree, "/11101/.well-known/core", tree.root()).unwrap();
        match represent(&tree, core, "").unwrap() {
            Representation::Links(doc) => assert_eq!(doc, ""),
            other => panic!("unexpected representation: {:?}", other),
        }
    }

    #[test]
    fn test_update_value() {
        let mut tree = sample_tree();
        let root = tree.root();
        update(&mut tree, root, "/11101/5001", json!("ristretto")).unwrap();
        match represent(&tree, root, "/11101/5001").unwrap() {
            Representation::Node(view) => assert_eq!(view.value, Some(json!("ristretto"))),
            other => panic!("unexpected representation: {:?}", other),
        }

        assert!(matches!(
            update(&mut tree, root, "/11101/5001/Description", json!(1)),
            Err(WriteError::ReadOnly(_))
        ));
        assert!(matches!(
            update(&mut tree, root, "/nope", json!(1)),
            Err(WriteError::NotFound(_))
        ));
    }
}
