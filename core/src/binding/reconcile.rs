//! Forward Reconciler (local → replicated)
//!
//! Walks a local element and its replicated counterpart together and issues
//! the smallest set of replicated writes that makes them equal. Work is
//! confined to the changed region:
//!
//! 1. Attributes are synced key by key
//! 2. Matching children are skipped from both ends (by identity, then by
//!    structure)
//! 3. The middle is consumed pair by pair: text groups are diffed, elements
//!    with matching names are recursed into (choosing between the left and
//!    right candidate with [`Reconciler::equality_factor`]), anything else
//!    is replaced
//! 4. Leftover replicated children are removed, leftover local units
//!    inserted
//!
//! All writes land in the caller's transaction.

use super::equality::{content_equal, marks_to_attrs, text_equal, values_equal};
use super::mapping::{normalize, LocalContent, MappingTable};
use super::text_diff::update_text;
use crate::crdt::{to_format, Container, YNode};
use crate::error::{BindingError, Result};
use crate::local::LocalNode;
use std::sync::Arc;
use tracing::trace;
use yrs::{Text, TransactionMut};

/// Outcome of a non-mutating lookahead over a candidate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EqualityFactor {
    /// Children matching from both ends
    pub factor: usize,

    /// Whether any of them matched by identity
    pub found_mapped: bool,
}

pub struct Reconciler<'a, 'doc> {
    txn: &'a mut TransactionMut<'doc>,
    mapping: &'a mut MappingTable,
    ignore: &'a str,
}

impl<'a, 'doc> Reconciler<'a, 'doc> {
    /// `ignore` is the diff annotation key
    pub fn new(txn: &'a mut TransactionMut<'doc>, mapping: &'a mut MappingTable, ignore: &'a str) -> Self {
        Self { txn, mapping, ignore }
    }

    /// Fails with [`BindingError::Inconsistent`] if `node` is an Element
    /// whose tag differs from the local node type
    ///
    /// This is the only way reconciling can fail, so callers run it before
    /// opening the transaction.
    pub fn check(node: &Container, local: &LocalNode) -> Result<()> {
        match node.tag() {
            Some(tag) if tag != local.kind() => Err(BindingError::Inconsistent {
                expected: tag,
                found: local.kind().to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Skip-ahead test: already mapped to this exact content, or
    /// structurally equal (in which case the mapping is refreshed)
    fn matches(&mut self, node: &YNode, unit: &LocalContent) -> bool {
        let id = node.id();
        if self.mapping.identity_matches(&id, unit) {
            return true;
        }
        if content_equal(&*self.txn, node, unit, self.ignore) {
            self.mapping.set(id, unit.clone());
            return true;
        }
        false
    }

    fn same_tag(node: &YNode, unit: &LocalContent) -> bool {
        match unit {
            LocalContent::Element(local) => node.tag().as_deref() == Some(local.kind()),
            LocalContent::Text(_) => false,
        }
    }

    /// Count children of `node` and `local` matching from both ends
    pub fn equality_factor(&self, node: &Container, local: &LocalNode) -> EqualityFactor {
        let children = node.children(&*self.txn);
        let units = normalize(local.children());
        let min = children.len().min(units.len());
        let mut found_mapped = false;

        let mut left = 0;
        while left < min {
            let (y, p) = (&children[left], &units[left]);
            if self.mapping.identity_matches(&y.id(), p) {
                found_mapped = true;
            } else if !content_equal(&*self.txn, y, p, self.ignore) {
                break;
            }
            left += 1;
        }
        let mut right = 0;
        while left + right < min {
            let y = &children[children.len() - right - 1];
            let p = &units[units.len() - right - 1];
            if self.mapping.identity_matches(&y.id(), p) {
                found_mapped = true;
            } else if !content_equal(&*self.txn, y, p, self.ignore) {
                break;
            }
            right += 1;
        }
        EqualityFactor {
            factor: left + right,
            found_mapped,
        }
    }

    fn update_attributes(&mut self, node: &Container, local: &LocalNode) {
        let current = node.attributes(&*self.txn);
        for (key, value) in local.attrs() {
            if key == self.ignore {
                continue;
            }
            if value.is_null() {
                if current.contains_key(key) {
                    node.remove_attribute(self.txn, key);
                }
            } else if !current.get(key).is_some_and(|c| values_equal(c, value)) {
                node.set_attribute(self.txn, key, value);
            }
        }
        for key in current.keys() {
            if key != self.ignore && !local.attrs().contains_key(key) {
                node.remove_attribute(self.txn, key);
            }
        }
    }

    /// Make the replicated `node` match `local`
    ///
    /// Checks the tag first; nothing is written when the check fails.
    pub fn update(&mut self, node: &Container, local: &Arc<LocalNode>) -> Result<()> {
        Self::check(node, local)?;
        self.sync(node, local);
        Ok(())
    }

    /// Body of [`Reconciler::update`] for a node whose tag is known to match.
    /// Recursion only descends into pairs with equal tags.
    fn sync(&mut self, node: &Container, local: &Arc<LocalNode>) {
        if node.tag().is_some() {
            self.update_attributes(node, local);
        }
        self.mapping.set(node.id(), LocalContent::Element(local.clone()));

        let units = normalize(local.children());
        let children = node.children(&*self.txn);
        let (y_count, p_count) = (children.len(), units.len());
        let min = y_count.min(p_count);

        let mut left = 0;
        while left < min && self.matches(&children[left], &units[left]) {
            left += 1;
        }
        let mut right = 0;
        while right + left + 1 < min
            && self.matches(&children[y_count - right - 1], &units[p_count - right - 1])
        {
            right += 1;
        }
        trace!("reconciling {:?}: {} kept left, {} kept right", node.id(), left, right);

        while y_count - left - right > 0 && p_count - left - right > 0 {
            let (left_y, left_p) = (&children[left], &units[left]);
            let (right_y, right_p) = (&children[y_count - right - 1], &units[p_count - right - 1]);

            if let (YNode::Text(text), LocalContent::Text(runs)) = (left_y, left_p) {
                if !text_equal(&*self.txn, text, runs, self.ignore) {
                    update_text(self.txn, text, runs, self.ignore);
                }
                self.mapping.set(left_y.id(), left_p.clone());
                left += 1;
                continue;
            }

            let mut update_left = Self::same_tag(left_y, left_p);
            let mut update_right = Self::same_tag(right_y, right_p);
            if update_left && update_right {
                if let (Some(ly), Some(ry), LocalContent::Element(lp), LocalContent::Element(rp)) =
                    (left_y.as_container(), right_y.as_container(), left_p, right_p)
                {
                    let l = self.equality_factor(&ly, lp);
                    let r = self.equality_factor(&ry, rp);
                    if l.found_mapped && !r.found_mapped {
                        update_right = false;
                    } else if !l.found_mapped && r.found_mapped {
                        update_left = false;
                    } else if l.factor < r.factor {
                        update_left = false;
                    } else {
                        update_right = false;
                    }
                }
            }

            match (update_left, update_right, left_y.as_container(), right_y.as_container(), left_p, right_p) {
                (true, _, Some(element), _, LocalContent::Element(local), _) => {
                    self.sync(&element, local);
                    left += 1;
                }
                (false, true, _, Some(element), _, LocalContent::Element(local)) => {
                    self.sync(&element, local);
                    right += 1;
                }
                _ => {
                    trace!("replacing child {} of {:?}", left, node.id());
                    node.remove(self.txn, left as u32, 1);
                    self.mapping.delete(&left_y.id());
                    self.insert(node, left, left_p);
                    left += 1;
                }
            }
        }

        let remaining = y_count - left - right;
        if let ([YNode::Text(text)], 0) = (children.as_slice(), p_count) {
            // Keep the Text node itself so concurrent edits to it survive
            let len = text.len(&*self.txn);
            if len > 0 {
                text.remove_range(self.txn, 0, len);
            }
            self.mapping.set(children[0].id(), LocalContent::Text(Vec::new()));
        } else if remaining > 0 {
            node.remove(self.txn, left as u32, remaining as u32);
            for child in &children[left..left + remaining] {
                self.mapping.delete(&child.id());
            }
        }

        for (offset, unit) in units[left..p_count - right].iter().enumerate() {
            self.insert(node, left + offset, unit);
        }
    }

    /// Build a fresh replicated node from local content at `index`
    fn insert(&mut self, parent: &Container, index: usize, unit: &LocalContent) {
        let id = match unit {
            LocalContent::Element(local) => {
                let element = Container::Element(parent.insert_element(self.txn, index as u32, local.kind()));
                for (key, value) in local.attrs() {
                    if key != self.ignore && !value.is_null() {
                        element.set_attribute(self.txn, key, value);
                    }
                }
                for (i, child) in normalize(local.children()).iter().enumerate() {
                    self.insert(&element, i, child);
                }
                element.id()
            }
            LocalContent::Text(runs) => {
                let text = parent.insert_text(self.txn, index as u32);
                let mut offset = 0;
                for run in runs {
                    let content = run.text_content().unwrap_or_default();
                    let marks = to_format(&marks_to_attrs(run.marks(), self.ignore));
                    text.insert_with_attributes(self.txn, offset, content, marks);
                    offset += run.node_size() as u32;
                }
                YNode::Text(text).id()
            }
        };
        self.mapping.set(id, unit.clone());
    }
}
