//! Replicated tree adapters
//!
//! The replicated document is a [`yrs`] document holding an XML fragment.
//! This module only adapts it to what the binding needs:
//!
//! - **Nodes:** [`YNode`] and [`Container`] over `XmlElementRef`,
//!   `XmlTextRef` and `XmlFragmentRef`, keyed by [`NodeId`]
//! - **Values:** conversions between attribute values and [`yrs::Any`]
//! - **History:** [`SnapshotPair`] and [`HistoryDoc`] for rendering a diff
//!   window between two [`Snapshot`]s
//! - **Changes:** [`ChangeQueue`], fed by a deep observer on the root
//! - **Sync:** state vector / update exchange between peers
//!
//! Documents must be created through [`new_doc`]: text offsets are counted
//! in UTF-16 code units and deleted content is kept for history.

mod events;
mod history;
mod node;
mod sync;

pub use events::{ChangeQueue, ChangeRecord};
pub use history::{HistoryDoc, SnapshotPair, Visibility};
pub use node::{
    any_to_value, marks_in_use, text_runs, text_runs_in, to_format, value_to_any, Container, NodeId, RunChange, TextRun,
    YNode,
};
pub use sync::{apply_update, encode_diff, encode_state_vector};
pub use yrs::{Doc, Snapshot};

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use yrs::{OffsetKind, Options, ReadTxn, Transact};

/// Replica identifier
pub type ClientId = u64;

/// Attribute map on the local side, ordered by key
pub type Attrs = BTreeMap<String, Value>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    #[error("Failed to decode update: {0}")]
    Decode(String),

    #[error("Failed to apply update: {0}")]
    Apply(String),

    #[error("Failed to restore history: {0}")]
    History(String),
}

/// Document replica usable by a binding
///
/// # Example
///
/// ```rust
/// use treesync_core::crdt::new_doc;
///
/// let doc = new_doc(7);
/// assert_eq!(doc.client_id(), 7);
/// ```
pub fn new_doc(client: ClientId) -> Doc {
    Doc::with_options(options(client))
}

/// Current state of `doc`, for use in a [`SnapshotPair`]
pub fn snapshot(doc: &Doc) -> Snapshot {
    doc.transact_mut().snapshot()
}

pub(crate) fn options(client: ClientId) -> Options {
    Options {
        client_id: client,
        offset_kind: OffsetKind::Utf16,
        skip_gc: true,
        ..Options::default()
    }
}
