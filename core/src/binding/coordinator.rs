//! Synchronization Coordinator
//!
//! [`Binding`] pairs one replicated root fragment with one local document.
//! It owns the mapping table and drives both directions:
//!
//! - Local edits go through [`Binding::reconcile_local_to_replicated`],
//!   which commits a single transaction tagged with the binding's
//!   [`Origin`]
//! - Remote changes are picked up by [`Binding::process_remote`], which
//!   skips the binding's own echoes and rebuilds the local document
//!
//! Selection is kept as sticky indexes so it survives remote edits.
//! History views (snapshot diffs) are requested with
//! [`Binding::render_snapshot`] and installed on the next
//! [`Binding::tick`], coalescing requests made in between.

use super::mapping::MappingTable;
use super::materialize::Materializer;
use super::position::{absolute_to_relative, relative_to_absolute};
use super::reconcile::Reconciler;
use crate::awareness::Awareness;
use crate::config::BindingConfig;
use crate::crdt::{ChangeQueue, ClientId, Container, Doc, HistoryDoc, Snapshot, SnapshotPair, YNode};
use crate::error::{BindingError, Result};
use crate::local::{LocalNode, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use yrs::{Origin, StickyIndex, Subscription, Transact, TransactionMut};

/// Absolute selection in the local document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// Collapsed selection at `pos`
    pub fn cursor(pos: usize) -> Self {
        Self::new(pos, pos)
    }
}

/// Selection anchored in the replicated tree
///
/// Serialized with each index in its v1 binary encoding, so peers running
/// any Yjs-compatible implementation can decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeSelection {
    #[serde(with = "sticky_bytes")]
    pub anchor: StickyIndex,

    #[serde(with = "sticky_bytes")]
    pub head: StickyIndex,
}

mod sticky_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use yrs::updates::decoder::Decode;
    use yrs::updates::encoder::Encode;
    use yrs::StickyIndex;

    pub fn serialize<S: Serializer>(index: &StickyIndex, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&index.encode_v1())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StickyIndex, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        StickyIndex::decode_v1(&bytes).map_err(D::Error::custom)
    }
}

/// Result of applying remote changes to the local document
#[derive(Debug, Clone)]
pub struct RemoteUpdate {
    /// New local root; unchanged subtrees are shared with the previous one
    pub root: Arc<LocalNode>,

    /// Restored selection, `None` if there was none or its anchors were
    /// deleted
    pub selection: Option<Selection>,
}

/// Another client's selection resolved against the local document
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSelection {
    pub client: ClientId,
    pub user: Value,
    pub selection: Selection,
}

/// Deferred full re-render
#[derive(Debug, Clone)]
enum PendingRender {
    Snapshot(SnapshotPair),
    Live,
}

pub struct Binding<S: Schema> {
    doc: Doc,
    root: Container,
    schema: S,
    config: BindingConfig,
    mapping: MappingTable,
    origin: Origin,

    changes: ChangeQueue,
    subscription: Option<Subscription>,
    local_root: Option<Arc<LocalNode>>,
    selection: Option<Selection>,
    relative_selection: Option<RelativeSelection>,

    /// History window currently displayed, `None` for the live document
    view: Option<SnapshotPair>,

    /// Whether the mapping table was last filled from a history copy
    rendered_history: bool,

    pending_render: Option<PendingRender>,
    disposed: bool,
}

impl<S: Schema> Binding<S> {
    /// Bind `config.root_name` in `doc`, creating the fragment if needed
    ///
    /// Must not be called while a transaction on `doc` is open.
    pub fn new(doc: &Doc, schema: S, config: BindingConfig) -> Result<Self> {
        config.validate()?;
        let fragment = doc.get_or_insert_xml_fragment(config.root_name.as_str());
        let changes = ChangeQueue::new();
        let subscription = changes.observe(&fragment);
        let origin = Origin::from(Uuid::new_v4().to_string().as_str());
        debug!(root = %config.root_name, ?origin, "binding created");

        Ok(Self {
            doc: doc.clone(),
            root: Container::Fragment(fragment),
            schema,
            config,
            mapping: MappingTable::new(),
            origin,
            changes,
            subscription: Some(subscription),
            local_root: None,
            selection: None,
            relative_selection: None,
            view: None,
            rendered_history: false,
            pending_render: None,
            disposed: false,
        })
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    pub fn root(&self) -> &Container {
        &self.root
    }

    /// Origin tagging every transaction this binding commits
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn schema(&self) -> &S {
        &self.schema
    }

    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    /// Local root as last reconciled or rendered
    pub fn local_root(&self) -> Option<&Arc<LocalNode>> {
        self.local_root.as_ref()
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn relative_selection(&self) -> Option<&RelativeSelection> {
        self.relative_selection.as_ref()
    }

    /// Whether a history window is currently displayed
    pub fn is_snapshot_view(&self) -> bool {
        self.view.is_some()
    }

    pub fn has_pending_render(&self) -> bool {
        self.pending_render.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(BindingError::Disposed);
        }
        Ok(())
    }

    fn own_transaction(&self) -> TransactionMut<'_> {
        self.doc.transact_mut_with(self.origin.clone())
    }

    /// Project a local edit onto the replicated tree
    ///
    /// All writes are committed in one transaction, or none at all when the
    /// local root does not fit the bound fragment. Nothing is written while
    /// a history window is displayed.
    pub fn reconcile_local_to_replicated(&mut self, local_root: &Arc<LocalNode>) -> Result<()> {
        self.ensure_live()?;
        if self.view.is_some() {
            debug!("history view displayed, local changes not replicated");
            return Ok(());
        }
        if local_root.kind() != self.config.root_kind {
            return Err(BindingError::Inconsistent {
                expected: self.config.root_kind.clone(),
                found: local_root.kind().to_string(),
            });
        }
        Reconciler::check(&self.root, local_root)?;
        if self.rendered_history {
            self.mapping.clear();
            self.rendered_history = false;
        }

        {
            let mut txn = self.doc.transact_mut_with(self.origin.clone());
            Reconciler::new(&mut txn, &mut self.mapping, &self.config.change_key).update(&self.root, local_root)?;
        }

        debug!(mapped = self.mapping.len(), "local changes reconciled");
        self.local_root = Some(local_root.clone());
        self.refresh_relative_selection();
        Ok(())
    }

    /// Rebuild the local document from the replicated tree
    ///
    /// With a window, content added or removed within it is annotated and
    /// attribute values are the ones in effect at the window's later
    /// snapshot. Nodes the schema rejects are dropped from the result; in
    /// the live document they are also deleted from the replicated tree, in
    /// history they are only skipped.
    pub fn materialize_replicated_to_local(&mut self, window: Option<&SnapshotPair>) -> Result<Arc<LocalNode>> {
        self.ensure_live()?;
        match window {
            Some(window) => self.materialize_history(window),
            None => self.materialize_live(),
        }
    }

    fn materialize_history(&mut self, window: &SnapshotPair) -> Result<Arc<LocalNode>> {
        // Nodes of a history copy are never reusable by another render
        self.mapping.clear();
        self.rendered_history = true;

        let history = HistoryDoc::restore(&self.doc, &self.config.root_name, window)?;
        let root = history.root();
        let mut txn = history.transact_mut();
        let mut materializer = Materializer::new(&mut txn, &self.schema, &mut self.mapping, &self.config, Some(window));
        let result = materializer.root(&root, &self.config.root_kind);
        let failed = materializer.into_failed();
        if !failed.is_empty() {
            debug!(count = failed.len(), "skipping rejected nodes in history view");
        }
        result.map_err(BindingError::RootRejected)
    }

    fn materialize_live(&mut self) -> Result<Arc<LocalNode>> {
        if self.rendered_history {
            self.mapping.clear();
            self.rendered_history = false;
        }

        let mut txn = self.doc.transact_mut_with(self.origin.clone());
        let (result, failed) = {
            let mut materializer = Materializer::new(&mut txn, &self.schema, &mut self.mapping, &self.config, None);
            let result = materializer.root(&self.root, &self.config.root_kind);
            (result, materializer.into_failed())
        };
        if !failed.is_empty() {
            // The rendered ancestors already exclude these nodes; the
            // deletion commits with the render as this binding's own echo
            warn!(count = failed.len(), "deleting nodes rejected by the schema");
            remove_nodes(&mut txn, &failed);
        }
        drop(txn);
        result.map_err(BindingError::RootRejected)
    }

    /// Apply pending remote changes to the local document
    ///
    /// Returns `None` when every pending change was this binding's own echo,
    /// or when the update was deferred to the next [`Binding::tick`] because
    /// a history window is displayed.
    pub fn process_remote(&mut self) -> Result<Option<RemoteUpdate>> {
        self.ensure_live()?;
        if self.subscription.is_none() {
            return Ok(None);
        }

        let mut remote = 0;
        for record in self.changes.drain() {
            self.mapping.retain(|node| !record.deletes(node));
            if record.origin.as_ref() == Some(&self.origin) {
                continue;
            }
            remote += 1;
            for node in &record.changed {
                self.mapping.delete(node);
            }
        }
        if remote == 0 {
            return Ok(None);
        }
        debug!(transactions = remote, "processing remote changes");

        if let Some(view) = &self.view {
            if self.pending_render.is_none() {
                self.pending_render = Some(PendingRender::Snapshot(view.clone()));
            }
            return Ok(None);
        }

        let root = self.materialize_live()?;
        self.local_root = Some(root.clone());
        let selection = self.restore_selection();
        Ok(Some(RemoteUpdate { root, selection }))
    }

    /// Display the diff between `prev` and `snapshot` on the next tick
    ///
    /// `prev` is expected to precede `snapshot`.
    pub fn render_snapshot(&mut self, snapshot: Snapshot, prev: Snapshot) -> Result<()> {
        self.ensure_live()?;
        self.schedule(PendingRender::Snapshot(SnapshotPair::new(snapshot, prev)));
        Ok(())
    }

    /// Go back to the live document on the next tick
    pub fn unrender_snapshot(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.schedule(PendingRender::Live);
        Ok(())
    }

    fn schedule(&mut self, render: PendingRender) {
        if let Some(previous) = self.pending_render.replace(render) {
            debug!(?previous, "coalescing deferred render");
        }
    }

    /// Run deferred work
    ///
    /// Returns the new local root if a render was pending. Does nothing
    /// after [`Binding::dispose`].
    pub fn tick(&mut self) -> Result<Option<Arc<LocalNode>>> {
        if self.disposed {
            return Ok(None);
        }
        let Some(pending) = self.pending_render.take() else {
            return Ok(None);
        };

        // A full render covers everything queued so far
        self.changes.drain();
        self.mapping.clear();

        let root = match pending {
            PendingRender::Snapshot(pair) => {
                let root = self.materialize_history(&pair)?;
                self.view = Some(pair);
                root
            }
            PendingRender::Live => {
                self.view = None;
                self.materialize_live()?
            }
        };
        debug!(history = self.view.is_some(), "deferred render executed");
        self.local_root = Some(root.clone());
        Ok(Some(root))
    }

    /// Discard the mapping table and rebuild the current view from scratch
    pub fn force_rerender(&mut self) -> Result<Arc<LocalNode>> {
        self.ensure_live()?;
        self.changes.drain();
        self.mapping.clear();
        let window = self.view.clone();
        let root = self.materialize_replicated_to_local(window.as_ref())?;
        self.local_root = Some(root.clone());
        Ok(root)
    }

    /// Unbind: pending work is dropped, not executed
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(pending) = self.pending_render.take() {
            warn!(?pending, "dropping deferred render on dispose");
        }
        // Dropping the subscription stops the observer
        self.subscription = None;
        self.changes.drain();
        self.mapping.clear();
        self.local_root = None;
        self.relative_selection = None;
        self.disposed = true;
        debug!(root = %self.config.root_name, "binding disposed");
    }

    /// Record the local selection, anchoring it in the replicated tree
    pub fn set_selection(&mut self, selection: Option<Selection>) -> Result<()> {
        self.ensure_live()?;
        self.selection = selection;
        self.refresh_relative_selection();
        Ok(())
    }

    fn refresh_relative_selection(&mut self) {
        self.relative_selection = self.selection.and_then(|selection| {
            let anchor = self.absolute_to_relative(selection.anchor)?;
            let head = self.absolute_to_relative(selection.head)?;
            Some(RelativeSelection { anchor, head })
        });
    }

    fn restore_selection(&mut self) -> Option<Selection> {
        let relative = self.relative_selection.as_ref()?;
        let restored = self
            .relative_to_absolute(&relative.anchor)
            .zip(self.relative_to_absolute(&relative.head))
            .map(|(anchor, head)| Selection::new(anchor, head));
        if restored.is_none() {
            debug!("selection anchors deleted, selection lost");
            self.relative_selection = None;
        }
        self.selection = restored;
        restored
    }

    /// Anchor local position `pos` in the replicated tree
    pub fn absolute_to_relative(&self, pos: usize) -> Option<StickyIndex> {
        let mut txn = self.own_transaction();
        absolute_to_relative(&mut txn, &self.root, pos, &self.mapping)
    }

    /// `None` if the anchor's node was deleted
    pub fn relative_to_absolute(&self, rel: &StickyIndex) -> Option<usize> {
        relative_to_absolute(&self.doc.transact(), &self.root, rel, &self.mapping)
    }

    /// Selections of every other client present in `awareness`, skipping
    /// those that no longer resolve
    pub fn remote_selections(&self, awareness: &Awareness) -> Vec<RemoteSelection> {
        let txn = self.doc.transact();
        let mut selections: Vec<RemoteSelection> = awareness
            .get_states()
            .iter()
            .filter(|(client, _)| **client != awareness.client_id())
            .filter_map(|(client, state)| {
                let cursor = state.state.cursor.as_ref()?;
                let anchor = relative_to_absolute(&txn, &self.root, &cursor.anchor, &self.mapping)?;
                let head = relative_to_absolute(&txn, &self.root, &cursor.head, &self.mapping)?;
                Some(RemoteSelection {
                    client: *client,
                    user: state.state.user.clone(),
                    selection: Selection::new(anchor, head),
                })
            })
            .collect();
        selections.sort_by_key(|s| s.client);
        selections
    }
}

/// Remove each node that is still a live child of its parent
fn remove_nodes(txn: &mut TransactionMut<'_>, nodes: &[YNode]) {
    for node in nodes {
        let Some(parent) = node.parent() else {
            continue;
        };
        if let Some(index) = parent.index_of(&*txn, &node.id()) {
            parent.remove(txn, index, 1);
        }
    }
}
