//! Awareness - Ephemeral presence of collaborators
//!
//! Unlike the replicated tree, awareness state is never persisted:
//! - Who's online
//! - Each collaborator's selection, as relative positions
//! - Custom user data
//!
//! Conflicts are resolved with a per-client increasing clock rather than
//! through the replicated tree. Resolving remote selections against the
//! local document is done by [`Binding::remote_selections`](crate::binding::Binding::remote_selections).
mod state;

pub use state::{Awareness, AwarenessState, AwarenessUpdate, PresenceState};

use std::time::Duration;

/// Default timeout for marking clients offline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often [`Awareness::heartbeat`] re-sends an unchanged local state
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
