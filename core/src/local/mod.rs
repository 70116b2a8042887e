//! Local editable tree
//!
//! The tree an editor surface renders: immutable, reference-counted
//! elements and formatted text runs. The binding creates nodes only through
//! a [`Schema`], which validates them.

mod node;
mod schema;

pub use node::{ElementNode, LocalNode, Mark, TextNode};
pub use schema::{BasicSchema, ContentKind, NodeSpec, Schema, SchemaError, SchemaSpec};
