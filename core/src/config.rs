//! Binding configuration
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration.

use crate::crdt::ClientId;
use crate::error::{BindingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Display information for a collaborator in history views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Name of the replicated root fragment
    pub root_name: String,

    /// Node type of the local root
    pub root_kind: String,

    /// Attribute and mark name carrying diff annotations; ignored when
    /// comparing or writing content
    pub change_key: String,

    /// Fallback color for added content
    pub added_color: String,

    /// Fallback color for removed content
    pub removed_color: String,

    pub collaborators: HashMap<ClientId, Collaborator>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            root_name: "prosemirror".to_string(),
            root_kind: "doc".to_string(),
            change_key: "change".to_string(),
            added_color: "#76c893".to_string(),
            removed_color: "#f28482".to_string(),
            collaborators: HashMap::new(),
        }
    }
}

impl BindingConfig {
    /// Parse and validate a JSON configuration
    ///
    /// # Example
    ///
    /// ```rust
    /// use treesync_core::BindingConfig;
    ///
    /// let config = BindingConfig::from_json(r#"{ "root_name": "notes" }"#).unwrap();
    /// assert_eq!(config.root_name, "notes");
    /// assert_eq!(config.change_key, "change");
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.root_name.is_empty() {
            return Err(BindingError::Config("root_name must not be empty".into()));
        }
        if self.root_kind.is_empty() {
            return Err(BindingError::Config("root_kind must not be empty".into()));
        }
        if self.change_key.is_empty() {
            return Err(BindingError::Config("change_key must not be empty".into()));
        }
        Ok(())
    }

    /// Register display information for a client
    pub fn with_collaborator(mut self, client: ClientId, name: impl Into<String>, color: impl Into<String>) -> Self {
        self.collaborators.insert(
            client,
            Collaborator {
                name: name.into(),
                color: color.into(),
            },
        );
        self
    }

    pub fn collaborator(&self, client: ClientId) -> Option<&Collaborator> {
        self.collaborators.get(&client)
    }
}
