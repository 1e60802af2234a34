//! State record and the update merge policy.

use serde::{Deserialize, Serialize};

use super::event::StateEvent;

/// What the merge policy did with an incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A merge-type run continued: `current` was replaced, history untouched.
    Collapsed,
    /// The previous `current` was pushed onto history, then replaced.
    Archived,
}

/// The stored value for one task: the current state plus the states it
/// superseded, oldest first.
///
/// Persisted as `{"current": {...}, "updates": [...]}`. History entries are
/// plain events, so a snapshot can never carry its own history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub current: StateEvent,
    #[serde(rename = "updates", default)]
    pub history: Vec<StateEvent>,
}

impl StateRecord {
    /// A fresh record with empty history.
    pub fn new(initial: StateEvent) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Apply `event` under the merge policy.
    ///
    /// Two consecutive events of `merge_type` collapse: only the newest is
    /// kept as `current`. Any other transition archives the old `current`.
    /// History therefore grows with distinct milestones, not with chunks.
    pub fn apply(&mut self, event: StateEvent, merge_type: &str) -> MergeOutcome {
        if self.current.is_kind(merge_type) && event.is_kind(merge_type) {
            self.current = event;
            return MergeOutcome::Collapsed;
        }

        let previous = std::mem::replace(&mut self.current, event);
        self.history.push(previous);
        MergeOutcome::Archived
    }

    /// Check if `current` reports a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }
}
