//! Lifecycle registry: the authoritative map from leaf id to reclamation deadline.
//!
//! All reads and writes go through one mutex and never span a gateway call.
//! A check first *claims* the entry; while claimed, other checks for the same
//! leaf back off, so at most one of them can reach the delete step.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::identity::{LeafId, ScopeId};

/// Registry state for one tracked leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReclamationEntry {
    /// Scope the leaf lives in; selects the structure lock for its cascade.
    pub scope: ScopeId,
    pub deadline: Instant,
    /// Checks that found the leaf occupied and pushed the deadline out.
    pub reschedules: u32,
    in_flight: bool,
}

impl ReclamationEntry {
    fn new(scope: ScopeId, deadline: Instant) -> Self {
        Self {
            scope,
            deadline,
            reschedules: 0,
            in_flight: false,
        }
    }

    pub fn is_checking(&self) -> bool {
        self.in_flight
    }
}

/// Result of trying to start a check against the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckGate {
    /// No entry: already deleted or never registered.
    Untracked,
    /// The deadline is still in the future.
    NotDue { deadline: Instant },
    /// Another check holds the entry.
    InFlight,
    /// The caller now owns the entry until it reschedules, releases or removes it.
    Claimed { scope: ScopeId },
}

#[derive(Debug, Default)]
pub struct LifecycleRegistry {
    entries: Mutex<HashMap<LeafId, ReclamationEntry>>,
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<LeafId, ReclamationEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `leaf` until `deadline`. Re-registering overwrites the previous entry.
    pub fn register(&self, leaf: LeafId, scope: ScopeId, deadline: Instant) {
        self.entries().insert(leaf, ReclamationEntry::new(scope, deadline));
    }

    pub fn claim(&self, leaf: LeafId, now: Instant) -> CheckGate {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(&leaf) else {
            return CheckGate::Untracked;
        };
        if now < entry.deadline {
            return CheckGate::NotDue {
                deadline: entry.deadline,
            };
        }
        if entry.in_flight {
            return CheckGate::InFlight;
        }
        entry.in_flight = true;
        CheckGate::Claimed { scope: entry.scope }
    }

    /// Finish a claimed check that found the leaf occupied.
    pub fn reschedule(&self, leaf: LeafId, deadline: Instant) -> bool {
        match self.entries().get_mut(&leaf) {
            Some(entry) => {
                entry.deadline = deadline;
                entry.reschedules += 1;
                entry.in_flight = false;
                true
            }
            None => false,
        }
    }

    /// Give up a claim without changing the deadline.
    pub fn release(&self, leaf: LeafId) {
        if let Some(entry) = self.entries().get_mut(&leaf) {
            entry.in_flight = false;
        }
    }

    pub fn remove(&self, leaf: LeafId) -> Option<ReclamationEntry> {
        self.entries().remove(&leaf)
    }

    pub fn get(&self, leaf: LeafId) -> Option<ReclamationEntry> {
        self.entries().get(&leaf).copied()
    }

    pub fn deadline_of(&self, leaf: LeafId) -> Option<Instant> {
        self.get(leaf).map(|entry| entry.deadline)
    }

    pub fn contains(&self, leaf: LeafId) -> bool {
        self.entries().contains_key(&leaf)
    }

    /// Tracked leaf ids in ascending order.
    pub fn tracked(&self) -> Vec<LeafId> {
        let mut leaves: Vec<LeafId> = self.entries().keys().copied().collect();
        leaves.sort_unstable();
        leaves
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
