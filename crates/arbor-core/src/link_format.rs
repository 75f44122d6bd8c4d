//! CoRE link-format rendering for `.well-known/core` discovery
//!
//! Each node lists only itself; graphs of descendants are not aggregated
//! into their ancestors' descriptions.

use crate::tree::{NodeId, ResourceTree};

/// Path segment of discovery containers
pub const WELL_KNOWN: &str = ".well-known";
/// Name of the discovery proxy under [`WELL_KNOWN`]
pub const CORE: &str = "core";

/// Content-format id for JSON payloads
pub const CT_JSON: u16 = 50;

/// Render the subtree below `base` as a link-format document
///
/// Paths are relative to `base`. Discovery containers are not listed.
pub fn render(tree: &ResourceTree, base: NodeId) -> String {
    render_with_prefix(tree, base, "")
}

/// Like [`render`], with every path prefixed by `prefix` (e.g. `/11101/0`)
pub fn render_with_prefix(tree: &ResourceTree, base: NodeId, prefix: &str) -> String {
    let mut links = Vec::new();
    collect(tree, base, prefix.trim_end_matches('/'), &mut links);
    links.join(",")
}

fn collect(tree: &ResourceTree, id: NodeId, prefix: &str, links: &mut Vec<String>) {
    for child in tree.children(id) {
        let node = tree.node(child);
        if node.name() == WELL_KNOWN {
            continue;
        }
        let path = format!("{}/{}", prefix, node.name());

        let mut link = format!("<{}>", path);
        if let Some(value) = node.value() {
            if let Some(rt) = value.get("resourceType").and_then(|v| v.as_str()) {
                link.push_str(&format!(";rt=\"{}\"", rt));
            }
            if let Some(iface) = value.get("interfaceType").and_then(|v| v.as_str()) {
                link.push_str(&format!(";if=\"{}\"", iface));
            }
        }
        link.push_str(&format!(";ct={}", CT_JSON));
        links.push(link);

        collect(tree, child, &path, links);
    }
}
