//! Resource tree: addressable nodes with exclusively owned children

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use thiserror::Error;

use crate::class::ResourceClass;
use crate::graph::DescriptionGraph;

/// Name of the root node
pub const ROOT_NAME: &str = "/";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Resource {name:?} already exists under {parent}")]
    DuplicateName { parent: String, name: String },
}

/// Handle to a node, valid only for the tree that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

/// A single resource in the tree
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    class: ResourceClass,
    parent: Option<NodeId>,
    children: IndexMap<String, NodeId>,
    value: Option<Value>,
    description: Option<DescriptionGraph>,
}

impl Node {
    fn new(name: String, class: ResourceClass, parent: Option<NodeId>) -> Self {
        Self {
            name,
            class,
            parent,
            children: IndexMap::new(),
            value: None,
            description: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &ResourceClass {
        &self.class
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn description(&self) -> Option<&DescriptionGraph> {
        self.description.as_ref()
    }

    /// Child names in creation order
    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }
}

/// Arena of nodes with a single root
///
/// Nodes are never removed, so a [`NodeId`] stays valid for the lifetime of
/// the tree that returned it.
#[derive(Debug, Clone)]
pub struct ResourceTree {
    nodes: Vec<Node>,
}

impl ResourceTree {
    /// Create a tree holding only a root of the given class
    pub fn new(root_class: ResourceClass) -> Self {
        Self {
            nodes: vec![Node::new(ROOT_NAME.to_string(), root_class, None)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create and attach a named child
    pub fn create(
        &mut self,
        parent: NodeId,
        name: &str,
        class: ResourceClass,
    ) -> Result<NodeId, TreeError> {
        if self.nodes[parent.0].children.contains_key(name) {
            return Err(TreeError::DuplicateName {
                parent: self.path_of(parent),
                name: name.to_string(),
            });
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name.to_string(), class, Some(parent)));
        self.nodes[parent.0].children.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent.0].children.get(name).copied()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.values().copied()
    }

    pub fn set_value(&mut self, id: NodeId, value: Value) {
        self.nodes[id.0].value = Some(value);
    }

    pub fn set_description(&mut self, id: NodeId, graph: DescriptionGraph) {
        self.nodes[id.0].description = Some(graph);
    }

    /// Description graph of a node, created empty on first access
    pub fn description_mut(&mut self, id: NodeId) -> &mut DescriptionGraph {
        self.nodes[id.0].description.get_or_insert_with(DescriptionGraph::new)
    }

    /// Absolute path of a node, built from node names
    pub fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(cid) = current {
            let node = &self.nodes[cid.0];
            if node.parent.is_some() {
                segments.push(node.name.as_str());
            }
            current = node.parent;
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    /// Depth-first, pre-order walk of the subtree rooted at `id`
    pub fn walk(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let children: Vec<_> = self.children(current).collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Indented outline of the subtree, one node per line
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.render_into(id, 0, &mut out);
        out
    }

    fn render_into(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = &self.nodes[id.0];
        let _ = write!(out, "{}{} [{}]", "  ".repeat(depth), node.name, node.class);
        if let Some(value) = &node.value {
            let _ = write!(out, " = {}", value);
        }
        out.push('\n');
        for child in self.children(id) {
            self.render_into(child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_and_lookup() {
        let mut tree = ResourceTree::new(ResourceClass::SmartObject);
        let obj = tree.create(tree.root(), "11101", ResourceClass::SmartObject).unwrap();
        let inst = tree.create(obj, "0", ResourceClass::SmartObject).unwrap();

        assert_eq!(tree.child(tree.root(), "11101"), Some(obj));
        assert_eq!(tree.child(obj, "0"), Some(inst));
        assert_eq!(tree.child(obj, "1"), None);
        assert_eq!(tree.node(inst).parent(), Some(obj));
        assert_eq!(tree.path_of(inst), "/11101/0");
        assert_eq!(tree.path_of(tree.root()), "/");
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut tree = ResourceTree::new(ResourceClass::SmartObject);
        tree.create(tree.root(), "services", ResourceClass::SmartObject).unwrap();
        let err = tree
            .create(tree.root(), "services", ResourceClass::Agent)
            .unwrap_err();
        assert_eq!(
            err,
            TreeError::DuplicateName {
                parent: "/".to_string(),
                name: "services".to_string()
            }
        );
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_walk_is_preorder() {
        let mut tree = ResourceTree::new(ResourceClass::SmartObject);
        let a = tree.create(tree.root(), "a", ResourceClass::SmartObject).unwrap();
        let a1 = tree.create(a, "1", ResourceClass::ObservableProperty).unwrap();
        let b = tree.create(tree.root(), "b", ResourceClass::SmartObject).unwrap();

        assert_eq!(tree.walk(tree.root()), vec![tree.root(), a, a1, b]);
        assert_eq!(tree.walk(a), vec![a, a1]);
    }

    #[test]
    fn test_render_outline() {
        let mut tree = ResourceTree::new(ResourceClass::SmartObject);
        let p = tree.create(tree.root(), "5001", ResourceClass::ObservableProperty).unwrap();
        tree.set_value(p, json!("ristretto"));

        let text = tree.render(tree.root());
        assert_eq!(text, "/ [SmartObject]\n  5001 [ObservableProperty] = \"ristretto\"\n");
    }
}
