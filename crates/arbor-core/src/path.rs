//! Slash-delimited path resolution against a resource tree

use thiserror::Error;

use crate::tree::{NodeId, ResourceTree};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No resource named {segment:?} while resolving {path}")]
pub struct PathError {
    pub path: String,
    pub segment: String,
}

/// Walk `path` segment by segment starting at `base`
///
/// Empty segments are skipped, so `/`, `//` and the empty string all
/// resolve to `base` itself.
pub fn resolve(tree: &ResourceTree, path: &str, base: NodeId) -> Result<NodeId, PathError> {
    let mut current = base;
    for segment in segments(path) {
        current = tree.child(current, segment).ok_or_else(|| PathError {
            path: path.to_string(),
            segment: segment.to_string(),
        })?;
    }
    Ok(current)
}

/// Non-empty segments of a path
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Path with its final segment removed; `/` when nothing remains
pub fn parent_path(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent,
        _ => "/",
    }
}

/// Number of separators in a path, used as its depth for build ordering
pub fn depth(path: &str) -> usize {
    path.matches('/').count()
}
