//! Diff windows over document history
//!
//! A [`SnapshotPair`] names a window between an earlier and a later
//! [`Snapshot`]. To render it, [`HistoryDoc::restore`] rebuilds a read-only
//! copy of the document holding everything visible in either snapshot:
//! items known to the later snapshot that the earlier one had not yet
//! deleted. Attribute values and formatting read from that copy are the
//! ones in effect at the later snapshot, never anything written after it.

use super::node::{Container, NodeId};
use super::{options, DocError};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::{Encoder, EncoderV1};
use yrs::{Doc, ReadTxn, Snapshot, Transact, TransactionMut, Update, XmlFragmentRef, ID};

/// Diff window between an earlier and a later snapshot
#[derive(Debug, Clone)]
pub struct SnapshotPair {
    /// The later snapshot
    pub snapshot: Snapshot,

    /// The earlier snapshot
    pub prev: Snapshot,
}

/// How an item shows up inside a diff window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Present in both snapshots
    Visible,

    /// Present only in the later snapshot
    Added,

    /// Present only in the earlier snapshot
    Removed,
}

fn is_visible(snapshot: &Snapshot, id: &ID) -> bool {
    id.clock < snapshot.state_map.get(&id.client) && !snapshot.delete_set.is_deleted(id)
}

impl SnapshotPair {
    pub fn new(snapshot: Snapshot, prev: Snapshot) -> Self {
        Self { snapshot, prev }
    }

    /// Classify an item against the window; `None` if visible in neither.
    pub fn visibility(&self, id: &ID) -> Option<Visibility> {
        match (is_visible(&self.snapshot, id), is_visible(&self.prev, id)) {
            (true, true) => Some(Visibility::Visible),
            (true, false) => Some(Visibility::Added),
            (false, true) => Some(Visibility::Removed),
            (false, false) => None,
        }
    }

    /// Classify a node; root types are always visible
    pub fn node_visibility(&self, node: &NodeId) -> Option<Visibility> {
        match node {
            NodeId::Nested(id) => self.visibility(id),
            NodeId::Root(_) => Some(Visibility::Visible),
        }
    }

    /// Items of the later snapshot, with deletions as of the earlier one
    ///
    /// The earlier snapshot is expected to precede the later one; content
    /// created after `snapshot` is never part of the window.
    fn union(&self) -> Snapshot {
        Snapshot::new(self.snapshot.state_map.clone(), self.prev.delete_set.clone())
    }
}

/// Read-only copy of a document covering a diff window
pub struct HistoryDoc {
    doc: Doc,
    root: XmlFragmentRef,
}

impl HistoryDoc {
    /// Rebuild the window's content from `doc`
    ///
    /// Fails if `doc` garbage-collected deleted content that the window
    /// still needs.
    pub fn restore(doc: &Doc, root_name: &str, window: &SnapshotPair) -> Result<Self, DocError> {
        let update = {
            let mut encoder = EncoderV1::new();
            doc.transact_mut()
                .encode_state_from_snapshot(&window.union(), &mut encoder)
                .map_err(|e| DocError::History(e.to_string()))?;
            encoder.to_vec()
        };

        let restored = Doc::with_options(options(doc.client_id()));
        let root = restored.get_or_insert_xml_fragment(root_name);
        {
            let update = Update::decode_v1(&update).map_err(|e| DocError::Decode(e.to_string()))?;
            let mut txn = restored.transact_mut();
            txn.apply_update(update)
                .map_err(|e| DocError::Apply(e.to_string()))?;
        }
        Ok(Self { doc: restored, root })
    }

    pub fn root(&self) -> Container {
        Container::Fragment(self.root.clone())
    }

    /// Transaction for reading the copy; rendering text runs through a
    /// window needs write access to split items at snapshot boundaries
    pub fn transact_mut(&self) -> TransactionMut<'_> {
        self.doc.transact_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::{new_doc, snapshot};
    use yrs::{Text, XmlFragment, XmlTextPrelim};

    #[test]
    fn test_visibility_tri_state() {
        let doc = new_doc(1);
        let root = doc.get_or_insert_xml_fragment("doc");
        let text = {
            let mut txn = doc.transact_mut();
            let text = root.insert(&mut txn, 0, XmlTextPrelim::new(""));
            text.insert(&mut txn, 0, "abc");
            text
        };
        let prev = snapshot(&doc);
        {
            let mut txn = doc.transact_mut();
            text.remove_range(&mut txn, 1, 1);
            text.insert(&mut txn, 2, "d");
        }
        let window = SnapshotPair::new(snapshot(&doc), prev);

        // clocks: 0 = text node, 1..=3 = "abc", 4 = "d"
        assert_eq!(window.visibility(&ID::new(1, 1)), Some(Visibility::Visible));
        assert_eq!(window.visibility(&ID::new(1, 2)), Some(Visibility::Removed));
        assert_eq!(window.visibility(&ID::new(1, 4)), Some(Visibility::Added));
        assert_eq!(window.visibility(&ID::new(1, 9)), None);
        assert_eq!(window.visibility(&ID::new(2, 0)), None);
    }

    #[test]
    fn test_restore_excludes_later_writes() {
        let doc = new_doc(1);
        let root = doc.get_or_insert_xml_fragment("doc");
        let text = {
            let mut txn = doc.transact_mut();
            let text = root.insert(&mut txn, 0, XmlTextPrelim::new(""));
            text.insert(&mut txn, 0, "kept");
            text
        };
        let s0 = snapshot(&doc);
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 4, " later");
            root.insert(&mut txn, 1, XmlTextPrelim::new("extra"));
        }

        let history = HistoryDoc::restore(&doc, "doc", &SnapshotPair::new(s0.clone(), s0)).unwrap();
        let txn = history.transact_mut();
        let children = history.root().children(&txn);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].text(&txn), "kept");
    }
}
