//! TreeSync Core - Editor tree binding for a replicated document
//!
//! Keeps a local, editor-facing document tree and a replicated CRDT tree
//! consistent in both directions:
//! - Local edits become minimal replicated writes, committed atomically
//! - Remote changes rebuild only the affected local subtrees
//! - Selections are stored as sticky indexes that survive concurrent edits
//! - History can be rendered as an annotated diff between two snapshots
//!
//! The replicated side is a [`yrs`] document, so any Yjs-compatible peer can
//! take part.
//!
//! # Examples
//!
//! ```rust
//! use treesync_core::crdt::{new_doc, Attrs};
//! use treesync_core::local::{BasicSchema, LocalNode};
//! use treesync_core::{Binding, BindingConfig};
//!
//! let schema = BasicSchema::from_json(
//!     r#"{ "nodes": {
//!            "doc": { "content": "block" },
//!            "paragraph": { "content": "inline" }
//!        } }"#,
//! ).unwrap();
//!
//! let doc = new_doc(1);
//! let mut binding = Binding::new(&doc, schema, BindingConfig::default()).unwrap();
//!
//! let text = LocalNode::text("Hello World", vec![]);
//! let local = LocalNode::element("doc", Attrs::new(), vec![
//!     LocalNode::element("paragraph", Attrs::new(), vec![text]),
//! ]);
//! binding.reconcile_local_to_replicated(&local).unwrap();
//!
//! let rendered = binding.force_rerender().unwrap();
//! assert_eq!(rendered.text_between(), "Hello World");
//! ```

pub mod awareness;
pub mod binding;
pub mod config;
pub mod crdt;
pub mod error;
pub mod local;

// Re-exports for convenience
pub use binding::{Binding, RemoteUpdate, Selection};
pub use config::BindingConfig;
pub use crdt::{new_doc, ClientId, Doc};
pub use error::{BindingError, Result};
