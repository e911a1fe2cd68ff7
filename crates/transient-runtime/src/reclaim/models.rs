//! Records returned by the creation and reclamation paths.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::GatewayError;
use crate::identity::{GroupId, LeafId, ScopeId};

/// A group resolved by lookup-or-create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupRef {
    pub id: GroupId,
    pub name: String,
    /// False when an existing group with the same name was reused.
    pub created: bool,
}

/// Handle returned to the command surface for a freshly created leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafHandle {
    pub id: LeafId,
    pub scope: ScopeId,
    pub name: String,
    pub group: Option<GroupRef>,
    /// First moment the leaf may be reclaimed.
    pub deadline: Instant,
}

/// Gateway step during which a check gave up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckStage {
    Occupancy,
    Parent,
    DeleteLeaf,
}

/// What a single empty-check decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No registry entry: the timer fired late or twice, or the entry was
    /// removed while the check ran.
    Untracked,
    NotDue { remaining: Duration },
    /// Another check for the same leaf is running.
    InFlight,
    /// The gateway no longer knows the leaf; the entry was dropped.
    AlreadyGone,
    Rescheduled { occupancy: usize, deadline: Instant },
    Deleted { group: Option<GroupOutcome> },
    /// A gateway error ended the check; the entry stays registered.
    Abandoned { stage: CheckStage, error: GatewayError },
}

impl CheckOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, CheckOutcome::Deleted { .. })
    }
}

/// What the cascade did with the parent group of a deleted leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupOutcome {
    Deleted(GroupId),
    Occupied { group: GroupId, members: usize },
    AlreadyGone(GroupId),
    Abandoned { group: GroupId, error: GatewayError },
}
