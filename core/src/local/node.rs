//! Local document nodes
//!
//! Nodes are immutable and shared through [`Arc`]. Two nodes are "the same"
//! only if they are the same allocation ([`Arc::ptr_eq`]); content equality
//! is a separate, more expensive question.

use crate::crdt::Attrs;
use serde_json::Value;
use std::sync::Arc;

/// A named formatting mark with parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub name: String,
    pub attrs: Attrs,
}

impl Mark {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attrs::new(),
        }
    }

    pub fn with_attrs(name: impl Into<String>, attrs: Attrs) -> Self {
        Self {
            name: name.into(),
            attrs,
        }
    }

    /// Build a mark from its replicated representation (an attribute whose
    /// value is an object of parameters)
    pub fn from_value(name: &str, value: &Value) -> Self {
        let attrs = match value {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Attrs::new(),
        };
        Self::with_attrs(name, attrs)
    }

    /// Replicated representation of the mark parameters
    pub fn to_value(&self) -> Value {
        Value::Object(self.attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

#[derive(Debug, Clone)]
pub struct ElementNode {
    kind: String,
    attrs: Attrs,
    children: Vec<Arc<LocalNode>>,
    leaf: bool,
    size: usize,
}

#[derive(Debug, Clone)]
pub struct TextNode {
    text: String,
    marks: Vec<Mark>,
}

/// Node of the local editable tree
#[derive(Debug, Clone)]
pub enum LocalNode {
    Element(ElementNode),
    Text(TextNode),
}

impl LocalNode {
    /// Element with content; size is computed once here
    pub fn element(kind: impl Into<String>, attrs: Attrs, children: Vec<Arc<LocalNode>>) -> Arc<Self> {
        let size = 2 + children.iter().map(|c| c.node_size()).sum::<usize>();
        Arc::new(LocalNode::Element(ElementNode {
            kind: kind.into(),
            attrs,
            children,
            leaf: false,
            size,
        }))
    }

    /// Element that cannot hold content (an image, a horizontal rule)
    pub fn leaf(kind: impl Into<String>, attrs: Attrs) -> Arc<Self> {
        Arc::new(LocalNode::Element(ElementNode {
            kind: kind.into(),
            attrs,
            children: Vec::new(),
            leaf: true,
            size: 1,
        }))
    }

    pub fn text(text: impl Into<String>, marks: Vec<Mark>) -> Arc<Self> {
        Arc::new(LocalNode::Text(TextNode {
            text: text.into(),
            marks,
        }))
    }

    /// Node type name; text runs report `"text"`
    pub fn kind(&self) -> &str {
        match self {
            LocalNode::Element(el) => &el.kind,
            LocalNode::Text(_) => "text",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, LocalNode::Text(_))
    }

    pub fn is_leaf(&self) -> bool {
        match self {
            LocalNode::Element(el) => el.leaf,
            LocalNode::Text(_) => true,
        }
    }

    pub fn attrs(&self) -> &Attrs {
        static EMPTY: Attrs = Attrs::new();
        match self {
            LocalNode::Element(el) => &el.attrs,
            LocalNode::Text(_) => &EMPTY,
        }
    }

    pub fn children(&self) -> &[Arc<LocalNode>] {
        match self {
            LocalNode::Element(el) => &el.children,
            LocalNode::Text(_) => &[],
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match self {
            LocalNode::Text(t) => Some(&t.text),
            LocalNode::Element(_) => None,
        }
    }

    pub fn marks(&self) -> &[Mark] {
        match self {
            LocalNode::Text(t) => &t.marks,
            LocalNode::Element(_) => &[],
        }
    }

    /// Size in document positions
    ///
    /// - Text: one per UTF-16 code unit
    /// - Leaf element: 1
    /// - Other elements: opening and closing boundary plus content
    pub fn node_size(&self) -> usize {
        match self {
            LocalNode::Element(el) => el.size,
            LocalNode::Text(t) => t.text.encode_utf16().count(),
        }
    }

    /// Size of the content between an element's boundaries
    pub fn content_size(&self) -> usize {
        match self {
            LocalNode::Element(el) if el.leaf => 0,
            LocalNode::Element(el) => el.size - 2,
            LocalNode::Text(t) => t.text.encode_utf16().count(),
        }
    }

    /// Concatenated text of the subtree
    pub fn text_between(&self) -> String {
        match self {
            LocalNode::Text(t) => t.text.clone(),
            LocalNode::Element(el) => el.children.iter().map(|c| c.text_between()).collect(),
        }
    }
}
