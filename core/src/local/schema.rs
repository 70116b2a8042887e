//! Node construction and validation
//!
//! The binding never builds local nodes directly; it asks a [`Schema`], which
//! may refuse. A refusal during materialization is treated as a transient
//! artifact of concurrent edits rather than a hard error.

use super::node::{LocalNode, Mark};
use crate::crdt::Attrs;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown node type: {0}")]
    UnknownKind(String),

    #[error("Node {parent} cannot contain {child}")]
    InvalidContent { parent: String, child: String },

    #[error("Unknown mark: {0}")]
    UnknownMark(String),

    #[error("Empty text nodes are not allowed")]
    EmptyText,
}

/// Builds local nodes, possibly rejecting them
pub trait Schema {
    fn element(&self, kind: &str, attrs: Attrs, children: Vec<Arc<LocalNode>>) -> std::result::Result<Arc<LocalNode>, SchemaError>;

    fn text(&self, text: &str, marks: Vec<Mark>) -> std::result::Result<Arc<LocalNode>, SchemaError>;
}

/// What an element may contain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Block elements only
    #[default]
    Block,

    /// Text and inline elements
    Inline,

    /// Nothing; the element is a leaf
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub content: ContentKind,

    /// Whether the element itself sits in inline content
    #[serde(default)]
    pub inline: bool,
}

/// Declarative description of a [`BasicSchema`]
///
/// # Example
///
/// ```rust
/// use treesync_core::local::SchemaSpec;
///
/// let spec: SchemaSpec = serde_json::from_str(r#"{
///     "nodes": {
///         "doc": { "content": "block" },
///         "paragraph": { "content": "inline" },
///         "image": { "content": "empty", "inline": true }
///     },
///     "marks": ["em", "strong"]
/// }"#).unwrap();
///
/// assert_eq!(spec.nodes.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSpec {
    pub nodes: BTreeMap<String, NodeSpec>,

    /// Allowed marks, in the order they are applied to text
    #[serde(default)]
    pub marks: Vec<String>,
}

/// Schema enforcing node names, content kinds and allowed marks
#[derive(Debug, Clone)]
pub struct BasicSchema {
    spec: SchemaSpec,
}

impl BasicSchema {
    pub fn new(spec: SchemaSpec) -> Self {
        Self { spec }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn spec(&self) -> &SchemaSpec {
        &self.spec
    }

    fn node_spec(&self, kind: &str) -> std::result::Result<&NodeSpec, SchemaError> {
        self.spec
            .nodes
            .get(kind)
            .ok_or_else(|| SchemaError::UnknownKind(kind.to_string()))
    }

    fn mark_rank(&self, name: &str) -> Option<usize> {
        self.spec.marks.iter().position(|m| m == name)
    }

    fn check_child(&self, parent: &str, content: ContentKind, child: &LocalNode) -> std::result::Result<(), SchemaError> {
        let inline = match child {
            LocalNode::Text(_) => true,
            LocalNode::Element(_) => self.node_spec(child.kind())?.inline,
        };
        let allowed = match content {
            ContentKind::Block => !inline,
            ContentKind::Inline => inline,
            ContentKind::Empty => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(SchemaError::InvalidContent {
                parent: parent.to_string(),
                child: child.kind().to_string(),
            })
        }
    }
}

impl Schema for BasicSchema {
    fn element(&self, kind: &str, attrs: Attrs, children: Vec<Arc<LocalNode>>) -> std::result::Result<Arc<LocalNode>, SchemaError> {
        let spec = self.node_spec(kind)?;
        for child in &children {
            self.check_child(kind, spec.content, child)?;
        }
        Ok(match spec.content {
            ContentKind::Empty => LocalNode::leaf(kind, attrs),
            _ => LocalNode::element(kind, attrs, children),
        })
    }

    fn text(&self, text: &str, mut marks: Vec<Mark>) -> std::result::Result<Arc<LocalNode>, SchemaError> {
        if text.is_empty() {
            return Err(SchemaError::EmptyText);
        }
        let mut ranked = Vec::with_capacity(marks.len());
        for mark in marks.drain(..) {
            let rank = self
                .mark_rank(&mark.name)
                .ok_or_else(|| SchemaError::UnknownMark(mark.name.clone()))?;
            ranked.push((rank, mark));
        }
        ranked.sort_by_key(|(rank, _)| *rank);
        Ok(LocalNode::text(text, ranked.into_iter().map(|(_, m)| m).collect()))
    }
}
