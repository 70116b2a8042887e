//! Position Translator
//!
//! Converts between absolute positions in the local document and
//! [`StickyIndex`]es anchored in the replicated tree.
//!
//! Local positions count one unit per UTF-16 code unit of text, one per leaf
//! element, and one for each element boundary; the root's own boundaries are
//! not counted. Element sizes come from the mapping table. An element with no
//! mapped local node counts as size 0.

use super::mapping::MappingTable;
use crate::crdt::{Container, YNode};
use yrs::{Assoc, IndexedSequence, Out, ReadTxn, StickyIndex, Text, TransactionMut};

fn next_sibling<T: ReadTxn>(txn: &T, node: &YNode) -> Option<YNode> {
    let siblings = node.parent()?.children(txn);
    let id = node.id();
    let at = siblings.iter().position(|child| child.id() == id)?;
    siblings.get(at + 1).cloned()
}

fn first_child<T: ReadTxn>(txn: &T, node: &Container) -> Option<YNode> {
    node.children(txn).into_iter().next()
}

/// Size a replicated child occupies in the local document
fn unit_size<T: ReadTxn>(txn: &T, node: &YNode, mapping: &MappingTable) -> usize {
    match node {
        YNode::Text(_) => node.text_len(txn) as usize,
        YNode::Element(_) => mapping.local_size(&node.id()).unwrap_or(0),
    }
}

/// Local size of the first `count` children of `node`
fn children_size<T: ReadTxn>(txn: &T, node: &Container, count: usize, mapping: &MappingTable) -> usize {
    node.children(txn)
        .iter()
        .take(count)
        .map(|child| unit_size(txn, child, mapping))
        .sum()
}

/// Anchor local position `pos` inside the tree below `root`
///
/// Positions inside text stick to the preceding character. Positions
/// between elements stick to the following element, and positions inside an
/// empty element anchor to the element itself.
///
/// # Arguments
///
/// * `txn` - Transaction on the replicated document
/// * `root` - Fragment the local document is bound to
/// * `pos` - Absolute local position
/// * `mapping` - Source of local element sizes
pub fn absolute_to_relative(
    txn: &mut TransactionMut,
    root: &Container,
    pos: usize,
    mapping: &MappingTable,
) -> Option<StickyIndex> {
    if pos == 0 {
        return root.sticky_index(txn, 0, Assoc::Before);
    }

    let mut pos = pos;
    let mut current = first_child(txn, root);
    while let Some(n) = current.take() {
        match &n {
            YNode::Text(text) => {
                let len = text.len(txn) as usize;
                if len >= pos {
                    return text.sticky_index(txn, pos as u32, Assoc::Before);
                }
                pos -= len;
                current = match next_sibling(txn, &n) {
                    Some(next) => Some(next),
                    None => ascend(txn, root, &n, &mut pos),
                };
            }
            YNode::Element(element) => {
                let size = mapping.local_size(&n.id()).unwrap_or(0);
                let container = Container::Element(element.clone());
                let first = first_child(txn, &container);
                if first.is_some() && pos < size {
                    current = first;
                    pos -= 1;
                } else {
                    if pos == 1 && container.len(txn) == 0 && size > 1 {
                        // Inside an empty element
                        return element.sticky_index(txn, 0, Assoc::After);
                    }
                    pos = pos.saturating_sub(size);
                    current = match next_sibling(txn, &n) {
                        Some(next) => Some(next),
                        None if pos == 0 => {
                            let parent = n.parent()?;
                            let len = parent.len(txn);
                            return parent.sticky_index(txn, len, Assoc::After);
                        }
                        None => ascend(txn, root, &n, &mut pos),
                    };
                }
            }
        }

        if pos == 0 {
            if let Some(next @ YNode::Element(_)) = &current {
                let parent = next.parent()?;
                let index = parent.index_of(txn, &next.id())?;
                return parent.sticky_index(txn, index, Assoc::After);
            }
        }
    }

    let len = root.len(txn);
    root.sticky_index(txn, len, Assoc::After)
}

/// Climb out of exhausted parents, spending one unit per closing boundary,
/// until a parent with a following sibling is found; `None` at `root`
fn ascend<T: ReadTxn>(txn: &T, root: &Container, from: &YNode, pos: &mut usize) -> Option<YNode> {
    let root_id = root.id();
    let mut up = from.parent()?;
    loop {
        *pos = pos.saturating_sub(1);
        if up.id() == root_id {
            return None;
        }
        let node = up.as_node()?;
        if let Some(next) = next_sibling(txn, &node) {
            return Some(next);
        }
        up = up.parent()?;
    }
}

/// Resolve `rel` to an absolute local position
///
/// Returns `None` if the anchor lies in a node that has been deleted, or
/// outside `root`.
pub fn relative_to_absolute<T: ReadTxn>(
    txn: &T,
    root: &Container,
    rel: &StickyIndex,
    mapping: &MappingTable,
) -> Option<usize> {
    let offset = rel.get_offset(txn)?;
    let index = offset.index as usize;
    let (mut pos, mut node, mut parent) = match Into::<Out>::into(offset.branch) {
        Out::YXmlText(text) => {
            let text = YNode::Text(text);
            (index, text.id(), text.parent())
        }
        Out::YXmlElement(element) => {
            let container = Container::Element(element);
            let pos = children_size(txn, &container, index, mapping) + 1;
            (pos, container.id(), container.parent())
        }
        Out::YXmlFragment(fragment) => {
            let container = Container::Fragment(fragment);
            (children_size(txn, &container, index, mapping) + 1, container.id(), None)
        }
        _ => return None,
    };

    let root_id = root.id();
    while node != root_id {
        let up = parent?;
        let at = up.index_of(txn, &node)? as usize;
        pos += 1 + children_size(txn, &up, at, mapping);
        node = up.id();
        parent = up.parent();
    }
    Some(pos.saturating_sub(1))
}
