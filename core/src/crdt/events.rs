//! Change notifications
//!
//! A deep observer on the root fragment turns every committed transaction
//! into one [`ChangeRecord`], queued until the binding drains it. The record
//! keeps the transaction's origin so a binding can recognise its own
//! writes.

use super::node::{Container, NodeId, YNode};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use yrs::types::Event;
use yrs::{DeepObservable, DeleteSet, Origin, Subscription, XmlFragmentRef, XmlOut};

/// Summary of one committed transaction
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub origin: Option<Origin>,

    /// Nodes whose children, attributes or text changed directly
    pub targets: Vec<NodeId>,

    /// `targets` plus all of their ancestors
    pub changed: HashSet<NodeId>,

    /// Items deleted by the transaction
    pub deleted: DeleteSet,
}

impl ChangeRecord {
    /// Whether the node was deleted by this transaction
    pub fn deletes(&self, node: &NodeId) -> bool {
        match node {
            NodeId::Nested(id) => self.deleted.is_deleted(id),
            NodeId::Root(_) => false,
        }
    }
}

/// Queue of [`ChangeRecord`]s for one root fragment
#[derive(Clone, Default)]
pub struct ChangeQueue {
    records: Arc<Mutex<Vec<ChangeRecord>>>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording changes under `root`; recording stops when the
    /// returned subscription is dropped
    pub fn observe(&self, root: &XmlFragmentRef) -> Subscription {
        let records = self.records.clone();
        root.observe_deep(move |txn, events| {
            let mut targets = Vec::new();
            let mut changed = HashSet::new();
            for event in events.iter() {
                let target = match event {
                    Event::XmlFragment(e) => e.target().clone(),
                    Event::XmlText(e) => XmlOut::Text(e.target().clone()),
                    _ => continue,
                };
                let id = match &target {
                    XmlOut::Text(text) => YNode::Text(text.clone()).id(),
                    other => match Container::from_out(other.clone()) {
                        Some(container) => container.id(),
                        None => continue,
                    },
                };
                targets.push(id.clone());
                changed.insert(id);

                let mut parent = match target {
                    XmlOut::Text(text) => YNode::Text(text).parent(),
                    other => Container::from_out(other).and_then(|c| c.parent()),
                };
                while let Some(node) = parent {
                    changed.insert(node.id());
                    parent = node.parent();
                }
            }

            let record = ChangeRecord {
                origin: txn.origin().cloned(),
                targets,
                changed,
                deleted: txn.delete_set().clone(),
            };
            if let Ok(mut queue) = records.lock() {
                queue.push(record);
            }
        })
    }

    /// Take all records queued so far, oldest first
    pub fn drain(&self) -> Vec<ChangeRecord> {
        match self.records.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().map(|queue| queue.is_empty()).unwrap_or(true)
    }
}
