//! Arbor Core - Resource tree, specification schema, and tree builder
//!
//! This crate provides the object model of an Arbor system:
//! - Resource tree with classed, addressable nodes and path resolution
//! - Description graphs attached to resources
//! - Observer bindings resolved from endpoint URIs
//! - Specification schema and the object-phase tree builder
//! - CoRE link-format rendering for discovery

pub mod builder;
pub mod class;
pub mod graph;
pub mod link_format;
pub mod observer;
pub mod path;
pub mod spec;
pub mod tree;

pub use builder::{build_objects, build_order, locate_registry, BuildError, Registry};
pub use class::{ResourceClass, ServiceScheme};
pub use graph::{DescriptionGraph, Triple};
pub use observer::{bind, BindError, Binding};
pub use path::{resolve, PathError};
pub use spec::{RelationKind, ResourceDescriptor, ServiceDescriptor, SpecError, Specification};
pub use tree::{Node, NodeId, ResourceTree, TreeError};
