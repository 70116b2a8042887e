//! Mapping Table
//!
//! Associates replicated nodes with the local content last rendered from
//! (or reconciled against) them:
//! - An Element maps to a single local element
//! - A Text node maps to the run of local text nodes it was decomposed into
//!
//! An entry is only as good as the last time the binding looked at the
//! node. Remote changes purge the entries of every node they touched, and of
//! its ancestors, so whatever is left still describes the node's content.

use crate::crdt::NodeId;
use crate::local::LocalNode;
use std::collections::HashMap;
use std::sync::Arc;

/// Local counterpart of a replicated node
#[derive(Debug, Clone)]
pub enum LocalContent {
    Element(Arc<LocalNode>),
    Text(Vec<Arc<LocalNode>>),
}

impl LocalContent {
    /// Reference equality: the same element allocation, or the same text
    /// run allocations in the same order
    pub fn identity_matches(&self, other: &LocalContent) -> bool {
        match (self, other) {
            (LocalContent::Element(a), LocalContent::Element(b)) => Arc::ptr_eq(a, b),
            (LocalContent::Text(a), LocalContent::Text(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
            }
            _ => false,
        }
    }

    pub fn as_element(&self) -> Option<&Arc<LocalNode>> {
        match self {
            LocalContent::Element(node) => Some(node),
            LocalContent::Text(_) => None,
        }
    }

    /// Size in local document positions
    pub fn node_size(&self) -> usize {
        match self {
            LocalContent::Element(node) => node.node_size(),
            LocalContent::Text(runs) => runs.iter().map(|r| r.node_size()).sum(),
        }
    }
}

/// Group consecutive text children into single units
///
/// A replicated Text node corresponds to a whole group, not to one run.
pub fn normalize(children: &[Arc<LocalNode>]) -> Vec<LocalContent> {
    let mut units = Vec::new();
    let mut runs: Vec<Arc<LocalNode>> = Vec::new();
    for child in children {
        if child.is_text() {
            runs.push(child.clone());
            continue;
        }
        if !runs.is_empty() {
            units.push(LocalContent::Text(std::mem::take(&mut runs)));
        }
        units.push(LocalContent::Element(child.clone()));
    }
    if !runs.is_empty() {
        units.push(LocalContent::Text(runs));
    }
    units
}

#[derive(Debug, Default)]
pub struct MappingTable {
    entries: HashMap<NodeId, LocalContent>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: &NodeId) -> Option<&LocalContent> {
        self.entries.get(node)
    }

    /// Record `content` as matching `node`
    pub fn set(&mut self, node: NodeId, content: LocalContent) {
        self.entries.insert(node, content);
    }

    pub fn delete(&mut self, node: &NodeId) -> Option<LocalContent> {
        self.entries.remove(node)
    }

    /// Keep only the entries for which `keep` holds
    pub fn retain(&mut self, mut keep: impl FnMut(&NodeId) -> bool) {
        self.entries.retain(|node, _| keep(node));
    }

    /// Whether the node is mapped to exactly `candidate`, by reference
    pub fn identity_matches(&self, node: &NodeId, candidate: &LocalContent) -> bool {
        self.get(node)
            .is_some_and(|mapped| mapped.identity_matches(candidate))
    }

    /// Reported size of the local element mapped to `node`
    pub fn local_size(&self, node: &NodeId) -> Option<usize> {
        self.get(node).map(LocalContent::node_size)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.entries.contains_key(node)
    }
}
