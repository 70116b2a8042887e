//! Text Run Differ
//!
//! Brings a replicated Text node in line with a group of local text runs
//! using a single replace (common prefix and suffix are kept), followed by a
//! formatting pass over the whole node so mark boundaries end up exactly
//! where the local runs put them.

use super::equality::marks_to_attrs;
use crate::crdt::{marks_in_use, text_runs, to_format, Attrs};
use crate::local::LocalNode;
use serde_json::Value;
use std::sync::Arc;
use yrs::{Text, TransactionMut, XmlTextRef};

/// A single replace, in characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub index: usize,
    pub remove: usize,
    pub insert: String,
}

/// Replace turning `a` into `b`, keeping their longest common prefix and the
/// longest common suffix not overlapping it
///
/// # Example
///
/// ```rust
/// use treesync_core::binding::simple_diff;
///
/// let edit = simple_diff("hello world", "hello brave world");
/// assert_eq!(edit.index, 6);
/// assert_eq!(edit.remove, 0);
/// assert_eq!(edit.insert, "brave ");
/// ```
pub fn simple_diff(a: &str, b: &str) -> TextEdit {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let max_suffix = a.len().min(b.len()) - prefix;
    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();

    TextEdit {
        index: prefix,
        remove: a.len() - prefix - suffix,
        insert: b[prefix..b.len() - suffix].iter().collect(),
    }
}

/// UTF-16 offset of the `chars`-th character of `s`
fn utf16_offset(s: &str, chars: usize) -> u32 {
    s.chars().take(chars).map(char::len_utf16).sum::<usize>() as u32
}

/// Rewrite `text` so its live runs match `runs`
///
/// Marks present anywhere on the node but missing from a run are cleared on
/// that run. Re-running with unchanged input writes nothing.
pub fn update_text(txn: &mut TransactionMut<'_>, text: &XmlTextRef, runs: &[Arc<LocalNode>], ignore: &str) {
    let legacy = marks_in_use(text, txn);
    let current: String = text_runs(text, txn).into_iter().map(|run| run.insert).collect();
    let target: String = runs.iter().filter_map(|r| r.text_content()).collect();

    let edit = simple_diff(&current, &target);
    let index = utf16_offset(&current, edit.index);
    let remove = utf16_offset(&current, edit.index + edit.remove) - index;
    tracing::trace!(
        index = edit.index,
        remove = edit.remove,
        insert = edit.insert.len(),
        "updating text"
    );
    if remove > 0 {
        text.remove_range(txn, index, remove);
    }
    if !edit.insert.is_empty() {
        text.insert(txn, index, &edit.insert);
    }

    let mut offset = 0;
    for run in runs {
        let len = run.node_size() as u32;
        let mut attrs: Attrs = legacy.iter().map(|name| (name.clone(), Value::Null)).collect();
        attrs.extend(marks_to_attrs(run.marks(), ignore));
        if !attrs.is_empty() {
            text.format(txn, offset, len, to_format(&attrs));
        }
        offset += len;
    }
}
