//! Error types for the binding layer

use crate::crdt::DocError;
use crate::local::SchemaError;
use thiserror::Error;

/// Result type alias for binding operations
pub type Result<T> = std::result::Result<T, BindingError>;

/// Errors surfaced to the host
///
/// Construction failures while materializing a child node are repaired in
/// place and never show up here; only a rejected root does.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    /// The paired local and replicated roots disagree on their node type
    #[error("Node name mismatch: expected {expected}, found {found}")]
    Inconsistent { expected: String, found: String },

    #[error("Document error: {0}")]
    Doc(#[from] DocError),

    #[error("Root node rejected by schema: {0}")]
    RootRejected(SchemaError),

    #[error("Binding has been disposed")]
    Disposed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for BindingError {
    fn from(err: serde_json::Error) -> Self {
        BindingError::Config(err.to_string())
    }
}
