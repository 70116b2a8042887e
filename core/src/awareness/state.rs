//! Awareness State Management
//!
//! Tracks the presence of every connected client: who they are and where
//! their selection sits in the replicated tree. Each client's state is
//! replaced wholesale; a higher clock wins.
use super::HEARTBEAT_INTERVAL;
use crate::binding::RelativeSelection;
use crate::crdt::ClientId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What a client shares with its peers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    /// Arbitrary user information (name, color, ...)
    pub user: Value,

    /// Selection anchored in the replicated tree
    pub cursor: Option<RelativeSelection>,
}

/// Awareness state for a single client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwarenessState {
    pub client_id: ClientId,
    pub state: PresenceState,

    /// Logical clock for conflict resolution
    pub clock: u64,

    /// Last update timestamp (for timeout detection)
    #[serde(skip)]
    pub last_updated: Option<Instant>,
}

/// Update message for awareness state changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwarenessUpdate {
    pub client_id: ClientId,
    pub state: Option<PresenceState>, // None = client left
    pub clock: u64,
}

/// Awareness manager tracking all client states
#[derive(Debug)]
pub struct Awareness {
    client_id: ClientId,
    states: HashMap<ClientId, AwarenessState>,

    /// Monotonic: never decreases, also when remote updates arrive
    clock: u64,
}

impl Awareness {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            states: HashMap::new(),
            clock: 0,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Get all current client states
    pub fn get_states(&self) -> &HashMap<ClientId, AwarenessState> {
        &self.states
    }

    pub fn get_state(&self, client_id: ClientId) -> Option<&AwarenessState> {
        self.states.get(&client_id)
    }

    pub fn get_local_state(&self) -> Option<&AwarenessState> {
        self.get_state(self.client_id)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Set local client's state (returns update to broadcast)
    pub fn set_local_state(&mut self, state: PresenceState) -> AwarenessUpdate {
        let clock = self.tick();
        self.states.insert(
            self.client_id,
            AwarenessState {
                client_id: self.client_id,
                state: state.clone(),
                clock,
                last_updated: Some(Instant::now()),
            },
        );

        AwarenessUpdate {
            client_id: self.client_id,
            state: Some(state),
            clock,
        }
    }

    /// Apply remote awareness update
    pub fn apply_update(&mut self, update: AwarenessUpdate) {
        self.clock = self.clock.max(update.clock);

        match update.state {
            Some(state) => {
                let newer = self
                    .states
                    .get(&update.client_id)
                    .map(|existing| update.clock > existing.clock)
                    .unwrap_or(true);

                if newer {
                    self.states.insert(
                        update.client_id,
                        AwarenessState {
                            client_id: update.client_id,
                            state,
                            clock: update.clock,
                            last_updated: Some(Instant::now()),
                        },
                    );
                }
            }
            None => {
                // Client left gracefully
                self.states.remove(&update.client_id);
            }
        }
    }

    /// Remove clients that haven't updated within timeout
    /// Returns list of removed client IDs
    pub fn remove_stale_clients(&mut self, timeout: Duration) -> Vec<ClientId> {
        let now = Instant::now();
        let local = self.client_id;
        let mut removed = Vec::new();

        self.states.retain(|client_id, state| {
            if *client_id == local {
                return true;
            }
            match state.last_updated {
                Some(last_updated) if now.duration_since(last_updated) > timeout => {
                    removed.push(*client_id);
                    false
                }
                _ => true,
            }
        });

        removed.sort_unstable();
        removed
    }

    /// Re-broadcast the local state once [`HEARTBEAT_INTERVAL`] has passed
    /// since it was last sent, so peers keep the client online
    pub fn heartbeat(&mut self) -> Option<AwarenessUpdate> {
        self.heartbeat_after(HEARTBEAT_INTERVAL)
    }

    /// [`Awareness::heartbeat`] with an explicit interval
    pub fn heartbeat_after(&mut self, interval: Duration) -> Option<AwarenessUpdate> {
        let local = self.states.get(&self.client_id)?;
        let due = local
            .last_updated
            .map(|sent| sent.elapsed() >= interval)
            .unwrap_or(true);
        if !due {
            return None;
        }
        let state = local.state.clone();
        Some(self.set_local_state(state))
    }

    /// Create update to signal local client leaving
    pub fn create_leave_update(&mut self) -> AwarenessUpdate {
        let clock = self.tick();
        self.states.remove(&self.client_id);
        AwarenessUpdate {
            client_id: self.client_id,
            state: None,
            clock,
        }
    }

    /// Get number of online clients (including self)
    pub fn client_count(&self) -> usize {
        self.states.len()
    }

    /// Get number of online clients excluding self
    pub fn other_client_count(&self) -> usize {
        self.states.len() - usize::from(self.states.contains_key(&self.client_id))
    }
}
