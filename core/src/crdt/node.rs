//! Node handles over the XML types
//!
//! A replicated Element is an `XmlElementRef`, a formatted Text node an
//! `XmlTextRef`, and the root an `XmlFragmentRef`. Every node is keyed by its
//! branch ID, which stays the same across replicas and across documents
//! restored from a snapshot.

use super::history::{SnapshotPair, Visibility};
use super::{Attrs, ClientId};
use serde_json::{Number, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use yrs::branch::{Branch, BranchID};
use yrs::types::text::{ChangeKind as YChangeKind, Diff, YChange};
use yrs::{
    Any, Assoc, IndexedSequence, Out, ReadTxn, StickyIndex, Text, TransactionMut, Xml, XmlElementPrelim,
    XmlElementRef, XmlFragment, XmlFragmentRef, XmlOut, XmlTextPrelim, XmlTextRef,
};

/// Largest integer an `f64` holds exactly
const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Stable identity of a replicated node
pub type NodeId = BranchID;

fn branch_id<T: AsRef<Branch>>(node: &T) -> NodeId {
    node.as_ref().id()
}

/// Replicated child node: an Element or a Text node
#[derive(Debug, Clone)]
pub enum YNode {
    Element(XmlElementRef),
    Text(XmlTextRef),
}

impl YNode {
    pub fn from_out(out: XmlOut) -> Option<Self> {
        match out {
            XmlOut::Element(element) => Some(YNode::Element(element)),
            XmlOut::Text(text) => Some(YNode::Text(text)),
            XmlOut::Fragment(_) => None,
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            YNode::Element(element) => branch_id(element),
            YNode::Text(text) => branch_id(text),
        }
    }

    pub fn tag(&self) -> Option<String> {
        match self {
            YNode::Element(element) => Some(element.tag().to_string()),
            YNode::Text(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, YNode::Text(_))
    }

    pub fn as_container(&self) -> Option<Container> {
        match self {
            YNode::Element(element) => Some(Container::Element(element.clone())),
            YNode::Text(_) => None,
        }
    }

    pub fn parent(&self) -> Option<Container> {
        let parent = match self {
            YNode::Element(element) => element.parent(),
            YNode::Text(text) => text.parent(),
        };
        parent.and_then(Container::from_out)
    }

    /// Plain text of a Text node, empty for Elements
    pub fn text<T: ReadTxn>(&self, txn: &T) -> String {
        match self {
            YNode::Text(text) => text_runs(text, txn).into_iter().map(|r| r.insert).collect(),
            YNode::Element(_) => String::new(),
        }
    }

    /// Length of a Text node in UTF-16 units, zero for Elements
    pub fn text_len<T: ReadTxn>(&self, txn: &T) -> u32 {
        match self {
            YNode::Text(text) => text.len(txn),
            YNode::Element(_) => 0,
        }
    }
}

/// Node that can hold children: the root fragment or an Element
#[derive(Debug, Clone)]
pub enum Container {
    Fragment(XmlFragmentRef),
    Element(XmlElementRef),
}

impl Container {
    pub fn from_out(out: XmlOut) -> Option<Self> {
        match out {
            XmlOut::Fragment(fragment) => Some(Container::Fragment(fragment)),
            XmlOut::Element(element) => Some(Container::Element(element)),
            XmlOut::Text(_) => None,
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Container::Fragment(fragment) => branch_id(fragment),
            Container::Element(element) => branch_id(element),
        }
    }

    /// Tag name; the root fragment has none
    pub fn tag(&self) -> Option<String> {
        match self {
            Container::Fragment(_) => None,
            Container::Element(element) => Some(element.tag().to_string()),
        }
    }

    pub fn parent(&self) -> Option<Container> {
        match self {
            Container::Fragment(_) => None,
            Container::Element(element) => element.parent().and_then(Container::from_out),
        }
    }

    /// Live children in document order
    pub fn children<T: ReadTxn>(&self, txn: &T) -> Vec<YNode> {
        match self {
            Container::Fragment(fragment) => fragment.children(txn).filter_map(YNode::from_out).collect(),
            Container::Element(element) => element.children(txn).filter_map(YNode::from_out).collect(),
        }
    }

    pub fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        match self {
            Container::Fragment(fragment) => fragment.len(txn),
            Container::Element(element) => element.len(txn),
        }
    }

    /// Index of a live child, `None` if `id` is not among the live children
    pub fn index_of<T: ReadTxn>(&self, txn: &T, id: &NodeId) -> Option<u32> {
        self.children(txn)
            .iter()
            .position(|child| &child.id() == id)
            .map(|index| index as u32)
    }

    pub fn attributes<T: ReadTxn>(&self, txn: &T) -> Attrs {
        match self {
            Container::Fragment(_) => Attrs::new(),
            Container::Element(element) => element
                .attributes(txn)
                .filter_map(|(key, value)| match value {
                    Out::Any(any) => Some((key.to_string(), any_to_value(&any))),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn set_attribute(&self, txn: &mut TransactionMut, key: &str, value: &Value) {
        if let Container::Element(element) = self {
            element.insert_attribute(txn, key, value_to_any(value));
        }
    }

    pub fn remove_attribute(&self, txn: &mut TransactionMut, key: &str) {
        if let Container::Element(element) = self {
            element.remove_attribute(txn, &key);
        }
    }

    pub fn insert_element(&self, txn: &mut TransactionMut, index: u32, tag: &str) -> XmlElementRef {
        match self {
            Container::Fragment(fragment) => fragment.insert(txn, index, XmlElementPrelim::empty(tag)),
            Container::Element(element) => element.insert(txn, index, XmlElementPrelim::empty(tag)),
        }
    }

    pub fn insert_text(&self, txn: &mut TransactionMut, index: u32) -> XmlTextRef {
        match self {
            Container::Fragment(fragment) => fragment.insert(txn, index, XmlTextPrelim::new("")),
            Container::Element(element) => element.insert(txn, index, XmlTextPrelim::new("")),
        }
    }

    pub fn remove(&self, txn: &mut TransactionMut, index: u32, len: u32) {
        match self {
            Container::Fragment(fragment) => fragment.remove_range(txn, index, len),
            Container::Element(element) => element.remove_range(txn, index, len),
        }
    }

    /// The Element as a child node; `None` for the root fragment
    pub fn as_node(&self) -> Option<YNode> {
        match self {
            Container::Fragment(_) => None,
            Container::Element(element) => Some(YNode::Element(element.clone())),
        }
    }

    /// Position between children that survives concurrent edits
    pub fn sticky_index(&self, txn: &mut TransactionMut, index: u32, assoc: Assoc) -> Option<StickyIndex> {
        match self {
            Container::Fragment(fragment) => fragment.sticky_index(txn, index, assoc),
            Container::Element(element) => element.sticky_index(txn, index, assoc),
        }
    }
}

/// How a run of text shows up in a diff window, and who wrote it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunChange {
    pub visibility: Visibility,
    pub client: ClientId,
}

/// One formatted insert of a Text node
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub insert: String,
    pub marks: Attrs,
    pub change: Option<RunChange>,
}

/// Live runs of a Text node
pub fn text_runs<T: ReadTxn>(text: &XmlTextRef, txn: &T) -> Vec<TextRun> {
    collect_runs(text.diff(txn, |change| change))
}

/// Runs of a Text node through a diff window
///
/// Formatting is taken as of the later snapshot; text visible in only one
/// snapshot carries a [`RunChange`].
pub fn text_runs_in(text: &XmlTextRef, txn: &mut TransactionMut, window: &SnapshotPair) -> Vec<TextRun> {
    collect_runs(text.diff_range(txn, Some(&window.snapshot), Some(&window.prev), |change| change))
}

fn collect_runs(diffs: Vec<Diff<YChange>>) -> Vec<TextRun> {
    diffs
        .into_iter()
        .filter_map(|diff| {
            // Embeds have no local counterpart
            let insert = match diff.insert {
                Out::Any(Any::String(s)) => s.to_string(),
                _ => return None,
            };
            let marks = diff
                .attributes
                .map(|attrs| attrs.iter().map(|(k, v)| (k.to_string(), any_to_value(v))).collect())
                .unwrap_or_default();
            let change = diff.ychange.map(|change| RunChange {
                visibility: match change.kind {
                    YChangeKind::Added => Visibility::Added,
                    YChangeKind::Removed => Visibility::Removed,
                },
                client: change.id.client,
            });
            Some(TextRun { insert, marks, change })
        })
        .collect()
}

/// Names of all formatting attributes present on a Text node
pub fn marks_in_use<T: ReadTxn>(text: &XmlTextRef, txn: &T) -> BTreeSet<String> {
    text_runs(text, txn)
        .into_iter()
        .flat_map(|run| run.marks.into_keys())
        .collect()
}

/// Local attributes as formatting attributes
pub fn to_format(attrs: &Attrs) -> yrs::types::Attrs {
    attrs
        .iter()
        .map(|(k, v)| (Arc::from(k.as_str()), value_to_any(v)))
        .collect()
}

pub fn any_to_value(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(b) => Value::Bool(*b),
        Any::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER as f64 => Value::from(*n as i64),
        Any::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        Any::BigInt(n) => Value::from(*n),
        Any::String(s) => Value::String(s.to_string()),
        Any::Buffer(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        Any::Array(items) => Value::Array(items.iter().map(any_to_value).collect()),
        Any::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.to_string(), any_to_value(v))).collect()),
    }
}

pub fn value_to_any(value: &Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(b) => Any::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) if i.abs() <= MAX_SAFE_INTEGER => Any::Number(i as f64),
            Some(i) => Any::BigInt(i),
            None => Any::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Any::String(s.as_str().into()),
        Value::Array(items) => Any::Array(items.iter().map(value_to_any).collect::<Vec<_>>().into()),
        Value::Object(map) => Any::Map(Arc::new(
            map.iter().map(|(k, v)| (k.clone(), value_to_any(v))).collect(),
        )),
    }
}
