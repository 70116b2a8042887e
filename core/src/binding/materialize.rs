//! Reverse Materializer (replicated → local)
//!
//! Builds local nodes from the replicated tree, reusing every mapped node
//! whose entry is still valid so that unchanged subtrees keep their
//! identity.
//!
//! Rendering through a [`SnapshotPair`] shows history. The transaction must
//! then belong to the window's [`HistoryDoc`](crate::crdt::HistoryDoc):
//! content visible in neither snapshot is skipped, content visible in only
//! one is kept and annotated as added or removed.
//!
//! Nodes the schema rejects are dropped from the output and reported in
//! [`Materializer::failed`]; deciding what to do with them is up to the
//! caller.

use super::mapping::{LocalContent, MappingTable};
use crate::config::BindingConfig;
use crate::crdt::{text_runs, text_runs_in, Attrs, ClientId, Container, NodeId, SnapshotPair, Visibility, YNode};
use crate::local::{LocalNode, Mark, Schema, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{trace, warn};
use yrs::{TransactionMut, XmlTextRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
}

/// Diff annotation attached to history content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAnnotation {
    #[serde(rename = "type")]
    pub kind: ChangeKind,

    /// Client that wrote the content; the document does not record who
    /// deleted something, so removals carry none
    pub client: Option<ClientId>,

    pub user: Option<String>,
    pub color: String,
}

impl ChangeAnnotation {
    pub fn new(kind: ChangeKind, client: Option<ClientId>, config: &BindingConfig) -> Self {
        let collaborator = client.and_then(|c| config.collaborator(c));
        let color = match (collaborator, kind) {
            (Some(c), _) => c.color.clone(),
            (None, ChangeKind::Added) => config.added_color.clone(),
            (None, ChangeKind::Removed) => config.removed_color.clone(),
        };
        Self {
            kind,
            client,
            user: collaborator.map(|c| c.name.clone()),
            color,
        }
    }

    /// Annotation for content created by `client`
    fn for_visibility(visibility: Visibility, client: ClientId, config: &BindingConfig) -> Option<Self> {
        match visibility {
            Visibility::Visible => None,
            Visibility::Added => Some(Self::new(ChangeKind::Added, Some(client), config)),
            Visibility::Removed => Some(Self::new(ChangeKind::Removed, None, config)),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "type": self.kind,
            "client": self.client,
            "user": self.user,
            "color": self.color,
        })
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

pub struct Materializer<'a, 'doc, S: Schema + ?Sized> {
    txn: &'a mut TransactionMut<'doc>,
    schema: &'a S,
    mapping: &'a mut MappingTable,
    config: &'a BindingConfig,
    window: Option<&'a SnapshotPair>,
    failed: Vec<YNode>,
}

impl<'a, 'doc, S: Schema + ?Sized> Materializer<'a, 'doc, S> {
    pub fn new(
        txn: &'a mut TransactionMut<'doc>,
        schema: &'a S,
        mapping: &'a mut MappingTable,
        config: &'a BindingConfig,
        window: Option<&'a SnapshotPair>,
    ) -> Self {
        Self {
            txn,
            schema,
            mapping,
            config,
            window,
            failed: Vec::new(),
        }
    }

    /// Nodes rejected by the schema during this pass
    pub fn failed(&self) -> &[YNode] {
        &self.failed
    }

    /// Finish the pass, handing back the rejected nodes and the transaction
    pub fn into_failed(self) -> Vec<YNode> {
        self.failed
    }

    /// Materialize the root fragment as a `kind` node
    ///
    /// Children the root cannot hold are dropped and reported like any other
    /// rejected node. Only a root that stays invalid without them is an
    /// error.
    pub fn root(&mut self, root: &Container, kind: &str) -> Result<Arc<LocalNode>, SchemaError> {
        if let Some(LocalContent::Element(node)) = self.mapping.get(&root.id()) {
            return Ok(node.clone());
        }
        let children = self.children(root);
        let nodes = children.iter().map(|(_, node)| node.clone()).collect();
        let node = match self.schema.element(kind, Attrs::new(), nodes) {
            Ok(node) => node,
            Err(err) => {
                warn!("Root rejected ({}), dropping offending children", err);
                let mut kept = Vec::new();
                for (source, child) in children {
                    if self.schema.element(kind, Attrs::new(), vec![child.clone()]).is_ok() {
                        kept.push(child);
                    } else if !self.failed.iter().any(|f| f.id() == source.id()) {
                        self.reject(&source);
                    }
                }
                self.schema.element(kind, Attrs::new(), kept)?
            }
        };
        self.mapping.set(root.id(), LocalContent::Element(node.clone()));
        Ok(node)
    }

    /// Local children of `node`, each paired with the replicated node it
    /// came from
    fn children(&mut self, node: &Container) -> Vec<(YNode, Arc<LocalNode>)> {
        let mut out = Vec::new();
        for child in node.children(&*self.txn) {
            let visibility = match self.window {
                Some(window) => match window.node_visibility(&child.id()) {
                    Some(visibility) => visibility,
                    None => continue,
                },
                None => Visibility::Visible,
            };
            match &child {
                YNode::Text(text) => {
                    if let Some(runs) = self.text(&child, text) {
                        out.extend(runs.into_iter().map(|run| (child.clone(), run)));
                    }
                }
                YNode::Element(_) => {
                    if let Some(element) = self.element(&child, visibility) {
                        out.push((child, element));
                    }
                }
            }
        }
        out
    }

    fn element(&mut self, node: &YNode, visibility: Visibility) -> Option<Arc<LocalNode>> {
        let id = node.id();
        if let Some(LocalContent::Element(local)) = self.mapping.get(&id) {
            trace!("reusing {:?}", id);
            return Some(local.clone());
        }
        let (container, tag) = node.as_container().zip(node.tag())?;

        let children = self.children(&container).into_iter().map(|(_, c)| c).collect();
        let mut attrs = container.attributes(&*self.txn);
        let creator = match &id {
            NodeId::Nested(item) => Some(item.client),
            NodeId::Root(_) => None,
        };
        if let Some(annotation) = creator.and_then(|c| ChangeAnnotation::for_visibility(visibility, c, self.config)) {
            attrs.insert(self.config.change_key.clone(), annotation.to_value());
        }

        match self.schema.element(&tag, attrs, children) {
            Ok(local) => {
                self.mapping.set(id, LocalContent::Element(local.clone()));
                Some(local)
            }
            Err(err) => {
                warn!("Dropping {:?} ({}): {}", id, tag, err);
                self.reject(node);
                None
            }
        }
    }

    fn text(&mut self, node: &YNode, text: &XmlTextRef) -> Option<Vec<Arc<LocalNode>>> {
        let id = node.id();
        if let Some(LocalContent::Text(runs)) = self.mapping.get(&id) {
            return Some(runs.clone());
        }

        let delta = match self.window {
            Some(window) => text_runs_in(text, self.txn, window),
            None => text_runs(text, &*self.txn),
        };
        let mut runs = Vec::new();
        for run in delta {
            let mut marks: Vec<Mark> = run
                .marks
                .iter()
                .map(|(name, value)| Mark::from_value(name, value))
                .collect();
            if let Some(change) = run.change {
                if let Some(annotation) = ChangeAnnotation::for_visibility(change.visibility, change.client, self.config) {
                    marks.push(Mark::from_value(&self.config.change_key, &annotation.to_value()));
                }
            }
            match self.schema.text(&run.insert, marks) {
                Ok(run) => runs.push(run),
                Err(err) => {
                    warn!("Dropping text {:?}: {}", id, err);
                    self.reject(node);
                    return None;
                }
            }
        }
        self.mapping.set(id, LocalContent::Text(runs.clone()));
        Some(runs)
    }

    fn reject(&mut self, node: &YNode) {
        self.mapping.delete(&node.id());
        self.failed.push(node.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::{apply_update, encode_diff, encode_state_vector, new_doc, snapshot, to_format, Doc, HistoryDoc};
    use crate::local::BasicSchema;
    use yrs::{Text, Transact, XmlTextRef};

    fn schema() -> BasicSchema {
        BasicSchema::from_json(
            r#"{
                "nodes": {
                    "doc": { "content": "block" },
                    "paragraph": { "content": "inline" },
                    "heading": { "content": "inline" },
                    "image": { "content": "empty", "inline": true }
                },
                "marks": ["em", "change"]
            }"#,
        )
        .unwrap()
    }

    fn root(doc: &Doc) -> Container {
        Container::Fragment(doc.get_or_insert_xml_fragment("prosemirror"))
    }

    fn build(doc: &Doc, paragraphs: &[&str]) -> Vec<(Container, XmlTextRef)> {
        let root = root(doc);
        let mut txn = doc.transact_mut();
        let start = root.len(&txn);
        let mut out = Vec::new();
        for (i, content) in paragraphs.iter().enumerate() {
            let p = Container::Element(root.insert_element(&mut txn, start + i as u32, "paragraph"));
            let t = p.insert_text(&mut txn, 0);
            t.insert(&mut txn, 0, content);
            out.push((p, t));
        }
        out
    }

    fn sync(from: &Doc, to: &Doc) {
        let update = encode_diff(from, &encode_state_vector(to)).unwrap();
        apply_update(to, &update, None).unwrap();
    }

    fn render(doc: &Doc, mapping: &mut MappingTable) -> (Arc<LocalNode>, Vec<YNode>) {
        let (schema, config) = (schema(), BindingConfig::default());
        let root = root(doc);
        let mut txn = doc.transact_mut();
        let mut m = Materializer::new(&mut txn, &schema, mapping, &config, None);
        let local = m.root(&root, "doc").unwrap();
        (local, m.into_failed())
    }

    fn render_window(doc: &Doc, window: &SnapshotPair, config: &BindingConfig) -> Arc<LocalNode> {
        let history = HistoryDoc::restore(doc, "prosemirror", window).unwrap();
        let schema = schema();
        let mut mapping = MappingTable::new();
        let mut txn = history.transact_mut();
        Materializer::new(&mut txn, &schema, &mut mapping, config, Some(window))
            .root(&history.root(), "doc")
            .unwrap()
    }

    fn run_changes(node: &LocalNode) -> Vec<(String, Option<ChangeKind>)> {
        node.children()
            .iter()
            .map(|run| {
                let change = run
                    .marks()
                    .iter()
                    .find(|m| m.name == "change")
                    .and_then(|m| ChangeAnnotation::from_value(&m.to_value()))
                    .map(|a| a.kind);
                (run.text_content().unwrap_or_default().to_string(), change)
            })
            .collect()
    }

    #[test]
    fn test_live_render() {
        let doc = new_doc(1);
        build(&doc, &["one", "two"]);
        let mut mapping = MappingTable::new();

        let (local, failed) = render(&doc, &mut mapping);
        assert!(failed.is_empty());
        assert_eq!(local.children().len(), 2);
        assert_eq!(local.children()[1].text_between(), "two");
        assert_eq!(local.node_size(), 2 + 5 + 5);
    }

    #[test]
    fn test_reuses_unchanged_subtrees() {
        let doc = new_doc(1);
        let built = build(&doc, &["keep", "edit"]);
        let mut mapping = MappingTable::new();
        let (first, _) = render(&doc, &mut mapping);

        {
            let mut txn = doc.transact_mut();
            built[1].1.insert(&mut txn, 4, "ed");
        }
        // the binding purges entries touched by a change before rendering
        mapping.delete(&root(&doc).id());
        mapping.delete(&built[1].0.id());
        mapping.delete(&YNode::Text(built[1].1.clone()).id());
        let (second, _) = render(&doc, &mut mapping);

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first.children()[0], &second.children()[0]));
        assert!(!Arc::ptr_eq(&first.children()[1], &second.children()[1]));
        assert_eq!(second.children()[1].text_between(), "edited");
    }

    #[test]
    fn test_schema_rejection_is_collected() {
        let doc = new_doc(1);
        let root = root(&doc);
        let bad = {
            let mut txn = doc.transact_mut();
            root.insert_element(&mut txn, 0, "paragraph");
            // An image is inline and cannot sit in the doc directly
            YNode::Element(root.insert_element(&mut txn, 1, "image")).id()
        };
        let mut mapping = MappingTable::new();

        let (local, failed) = render(&doc, &mut mapping);
        assert_eq!(local.children().len(), 1);
        assert_eq!(failed.iter().map(YNode::id).collect::<Vec<_>>(), vec![bad]);
    }

    #[test]
    fn test_nested_rejection_drops_parent() {
        let doc = new_doc(1);
        let root = root(&doc);
        let outer = {
            let mut txn = doc.transact_mut();
            let outer = Container::Element(root.insert_element(&mut txn, 0, "paragraph"));
            outer.insert_element(&mut txn, 0, "paragraph");
            outer.id()
        };
        build(&doc, &["fine"]);
        let mut mapping = MappingTable::new();

        let (local, failed) = render(&doc, &mut mapping);
        assert_eq!(local.children().len(), 1);
        assert_eq!(local.children()[0].text_between(), "fine");
        assert_eq!(failed.iter().map(YNode::id).collect::<Vec<_>>(), vec![outer.clone()]);
        assert!(!mapping.contains(&outer));
    }

    #[test]
    fn test_window_annotates_changes() {
        let (alice, bob) = (new_doc(1), new_doc(2));
        build(&alice, &["gone", "hello"]);
        sync(&alice, &bob);
        let before = snapshot(&alice);

        {
            let root = root(&bob);
            let mut txn = bob.transact_mut();
            let text = match root.children(&txn).get(1).and_then(YNode::as_container) {
                Some(p) => p.children(&txn),
                None => panic!("second paragraph missing"),
            };
            let YNode::Text(text) = &text[0] else { panic!("expected text") };
            text.remove_range(&mut txn, 3, 2);
            text.insert(&mut txn, 3, "p");
            root.remove(&mut txn, 0, 1);
        }
        sync(&bob, &alice);

        let window = SnapshotPair::new(snapshot(&alice), before);
        let config = BindingConfig::default().with_collaborator(2, "Bob", "#0000ff");
        let local = render_window(&alice, &window, &config);

        let removed = &local.children()[0];
        let annotation = ChangeAnnotation::from_value(&removed.attrs()["change"]).unwrap();
        assert_eq!(annotation.kind, ChangeKind::Removed);
        assert_eq!(annotation.client, None);
        assert_eq!(removed.text_between(), "gone");

        let runs = run_changes(&local.children()[1]);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0], ("hel".to_string(), None));
        assert!(runs.contains(&("lo".to_string(), Some(ChangeKind::Removed))));
        assert!(runs.contains(&("p".to_string(), Some(ChangeKind::Added))));
        let added = local.children()[1]
            .children()
            .iter()
            .flat_map(|run| run.marks())
            .filter(|m| m.name == "change")
            .filter_map(|m| ChangeAnnotation::from_value(&m.to_value()))
            .find(|a| a.kind == ChangeKind::Added)
            .unwrap();
        assert_eq!(added.client, Some(2));
        assert_eq!(added.user.as_deref(), Some("Bob"));
        assert_eq!(added.color, "#0000ff");
    }

    #[test]
    fn test_window_uses_attributes_and_marks_as_of_snapshot() {
        let (alice, bob) = (new_doc(1), new_doc(2));
        {
            let root = root(&alice);
            let mut txn = alice.transact_mut();
            let heading = Container::Element(root.insert_element(&mut txn, 0, "heading"));
            heading.set_attribute(&mut txn, "level", &serde_json::json!(1));
            heading.insert_text(&mut txn, 0).insert(&mut txn, 0, "T");
        }
        let s0 = snapshot(&alice);
        sync(&alice, &bob);
        {
            let root = root(&bob);
            let mut txn = bob.transact_mut();
            let Some(heading) = root.children(&txn)[0].as_container() else { panic!("expected heading") };
            heading.set_attribute(&mut txn, "level", &serde_json::json!(3));
            let children = heading.children(&txn);
            let YNode::Text(text) = &children[0] else { panic!("expected text") };
            let mut em = Attrs::new();
            em.insert("em".into(), serde_json::json!(true));
            text.format(&mut txn, 0, 1, to_format(&em));
        }
        sync(&bob, &alice);
        let s1 = snapshot(&alice);
        let config = BindingConfig::default();

        let then = render_window(&alice, &SnapshotPair::new(s0.clone(), s0.clone()), &config);
        let heading = &then.children()[0];
        assert_eq!(heading.attrs()["level"], serde_json::json!(1));
        assert!(heading.children()[0].marks().is_empty());

        let now = render_window(&alice, &SnapshotPair::new(s1, s0), &config);
        let heading = &now.children()[0];
        assert_eq!(heading.attrs()["level"], serde_json::json!(3));
        assert!(heading.children()[0].marks().iter().any(|m| m.name == "em"));
    }

    #[test]
    fn test_annotation_colors() {
        let config = BindingConfig::default().with_collaborator(5, "Eve", "#abcdef");
        let known = ChangeAnnotation::new(ChangeKind::Added, Some(5), &config);
        let unknown = ChangeAnnotation::new(ChangeKind::Removed, None, &config);

        assert_eq!(known.color, "#abcdef");
        assert_eq!(known.user.as_deref(), Some("Eve"));
        assert_eq!(unknown.color, config.removed_color);
        assert_eq!(unknown.user, None);
        assert_eq!(ChangeAnnotation::from_value(&unknown.to_value()), Some(unknown));
    }
}
