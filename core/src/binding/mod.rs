//! Binding between the replicated tree and the local tree
//!
//! The pieces, bottom-up:
//!
//! - [`MappingTable`]: replicated node → local content last seen for it
//! - [`equality`]: structural comparison of both sides
//! - [`simple_diff`] / [`update_text`]: minimal text replacement
//! - [`Reconciler`]: local → replicated
//! - [`Materializer`]: replicated → local, optionally through a history window
//! - [`absolute_to_relative`] / [`relative_to_absolute`]: position translation
//! - [`Binding`]: owns all of the above for one pair of trees

mod coordinator;
pub mod equality;
mod mapping;
mod materialize;
mod position;
mod reconcile;
mod text_diff;

pub use coordinator::{Binding, RelativeSelection, RemoteSelection, RemoteUpdate, Selection};
pub use mapping::{normalize, LocalContent, MappingTable};
pub use materialize::{ChangeAnnotation, ChangeKind, Materializer};
pub use position::{absolute_to_relative, relative_to_absolute};
pub use yrs::StickyIndex;
pub use reconcile::{EqualityFactor, Reconciler};
pub use text_diff::{simple_diff, update_text, TextEdit};
