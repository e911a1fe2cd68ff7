//! Reclamation scheduler: debounced empty-checks and the leaf → group cascade.
//!
//! Each tracked leaf cycles through `pending → (occupied → pending)* → deleted`.
//! A check only acts once the leaf's deadline has passed; an occupied leaf gets a
//! fresh deadline one grace period out and its timer is re-armed. Deleting a
//! leaf is followed, after a short settle delay, by an opportunistic check of its
//! parent group.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result, RuntimeError};
use crate::gateway::ResourceGateway;
use crate::identity::{GroupId, LeafId, ScopeId};

use super::models::{CheckOutcome, CheckStage, GroupOutcome};
use super::registry::{CheckGate, LifecycleRegistry};
use super::timer::{self, TimerCommand};

/// Reclamation timing knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReclaimConfig {
    /// Delay before the first empty-check and between checks of an occupied leaf.
    pub grace_period: Duration,
    /// Pause between a confirmed leaf deletion and the parent group check.
    pub group_settle_delay: Duration,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            group_settle_delay: Duration::from_secs(1),
        }
    }
}

/// One async lock per scope, created on first use.
#[derive(Default)]
struct ScopeLocks {
    locks: std::sync::Mutex<HashMap<ScopeId, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    async fn lock(&self, scope: ScopeId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(scope).or_default())
        };
        lock.lock_owned().await
    }
}

struct SchedulerInner<G> {
    gateway: Arc<G>,
    registry: LifecycleRegistry,
    config: ReclaimConfig,
    timers: mpsc::UnboundedSender<TimerCommand>,
    stopped: AtomicBool,
    /// Per scope, held across group lookup-or-create + leaf creation and across
    /// the group cascade, so neither interleaves with the other inside this
    /// process. Scopes never wait on each other.
    structure: ScopeLocks,
}

/// Owns the lifecycle registry and the timer driver. Cheap to clone.
pub struct ReclamationScheduler<G: ResourceGateway> {
    inner: Arc<SchedulerInner<G>>,
}

impl<G: ResourceGateway> Clone for ReclamationScheduler<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G: ResourceGateway> ReclamationScheduler<G> {
    /// Spawns the timer driver on the current tokio runtime.
    pub fn start(gateway: Arc<G>, config: ReclaimConfig) -> Self {
        let (timers, commands) = mpsc::unbounded_channel();
        let inner = Arc::new(SchedulerInner {
            gateway,
            registry: LifecycleRegistry::new(),
            config,
            timers,
            stopped: AtomicBool::new(false),
            structure: ScopeLocks::default(),
        });
        let owner = Arc::downgrade(&inner);
        tokio::spawn(timer::drive(commands, move |leaf| dispatch_check(&owner, leaf)));
        Self { inner }
    }

    pub fn config(&self) -> &ReclaimConfig {
        &self.inner.config
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.inner.gateway
    }

    pub fn registry(&self) -> &LifecycleRegistry {
        &self.inner.registry
    }

    /// Structure lock of `scope`.
    pub(crate) async fn lock_scope(&self, scope: ScopeId) -> OwnedMutexGuard<()> {
        self.inner.structure.lock(scope).await
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire) && !self.inner.timers.is_closed()
    }

    /// Register a newly created leaf and arm its first check.
    pub fn track(&self, scope: ScopeId, leaf: LeafId) -> Result<Instant> {
        let grace = self.inner.config.grace_period;
        let deadline = Instant::now() + grace;
        self.inner.registry.register(leaf, scope, deadline);
        if let Err(error) = self.arm(leaf, deadline) {
            self.inner.registry.remove(leaf);
            return Err(error);
        }
        debug!(%scope, %leaf, grace_ms = grace.as_millis() as u64, "leaf tracked");
        Ok(deadline)
    }

    /// Arm a check for `leaf` one grace period from now. Duplicates are harmless.
    pub fn schedule_check(&self, leaf: LeafId) -> Result<()> {
        self.arm(leaf, Instant::now() + self.inner.config.grace_period)
    }

    fn arm(&self, leaf: LeafId, at: Instant) -> Result<()> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(RuntimeError::SchedulerStopped);
        }
        self.inner
            .timers
            .send(TimerCommand::Arm { leaf, at })
            .map_err(|_| RuntimeError::SchedulerStopped)
    }

    /// Schedule a fresh check for a tracked leaf, e.g. one left behind by an
    /// abandoned check. Returns false when the leaf is not tracked.
    pub fn rearm(&self, leaf: LeafId) -> Result<bool> {
        if !self.inner.registry.contains(leaf) {
            return Ok(false);
        }
        self.schedule_check(leaf)?;
        debug!(%leaf, "check re-armed");
        Ok(true)
    }

    /// Re-arm every tracked leaf.
    pub fn sweep(&self) -> Result<usize> {
        let leaves = self.inner.registry.tracked();
        for leaf in &leaves {
            self.schedule_check(*leaf)?;
        }
        info!(count = leaves.len(), "re-armed tracked leaves");
        Ok(leaves.len())
    }

    /// Stop the timer driver. Armed checks that have not fired are dropped.
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.inner.timers.send(TimerCommand::Shutdown).is_err() {
            debug!("timer driver already gone");
        }
        info!(tracked = self.inner.registry.len(), "reclamation scheduler stopped");
    }

    pub async fn perform_check(&self, leaf: LeafId) -> CheckOutcome {
        let registry = &self.inner.registry;
        let now = Instant::now();
        let scope = match registry.claim(leaf, now) {
            CheckGate::Untracked => {
                debug!(%leaf, "leaf not tracked, skipping check");
                return CheckOutcome::Untracked;
            }
            CheckGate::NotDue { deadline } => {
                let remaining = deadline.saturating_duration_since(now);
                debug!(
                    %leaf,
                    remaining_ms = remaining.as_millis() as u64,
                    "check fired before deadline"
                );
                return CheckOutcome::NotDue { remaining };
            }
            CheckGate::InFlight => {
                debug!(%leaf, "another check is running for this leaf");
                return CheckOutcome::InFlight;
            }
            CheckGate::Claimed { scope } => scope,
        };

        debug!(%leaf, "checking whether leaf has to be removed");
        let gateway = &self.inner.gateway;
        let occupancy = match gateway.occupancy_of(leaf).await {
            Ok(occupancy) => occupancy,
            Err(error) => return self.check_failed(leaf, CheckStage::Occupancy, error),
        };

        if occupancy > 0 {
            let deadline = Instant::now() + self.inner.config.grace_period;
            if !registry.reschedule(leaf, deadline) {
                warn!(%leaf, occupancy, "entry vanished while its check was running");
                return CheckOutcome::Untracked;
            }
            if let Err(error) = self.arm(leaf, deadline) {
                warn!(%leaf, %error, "could not re-arm check for occupied leaf");
            }
            debug!(%leaf, occupancy, "leaf is not empty, rescheduled");
            return CheckOutcome::Rescheduled {
                occupancy,
                deadline,
            };
        }

        let parent = match gateway.parent_of(leaf).await {
            Ok(parent) => parent,
            Err(error) => return self.check_failed(leaf, CheckStage::Parent, error),
        };
        debug!(%leaf, "leaf empty, deleting it");
        match gateway.delete_leaf(leaf).await {
            Ok(()) => info!(%leaf, "leaf deleted"),
            // Removed by someone else after the parent was read; the group
            // still needs its cascade.
            Err(error) if error.is_absent() => info!(%leaf, "leaf already deleted"),
            Err(error) => return self.check_failed(leaf, CheckStage::DeleteLeaf, error),
        }
        registry.remove(leaf);

        let group = match parent {
            Some(group) => {
                let settle = self.inner.config.group_settle_delay;
                if !settle.is_zero() {
                    tokio::time::sleep(settle).await;
                }
                Some(self.maybe_delete_group(scope, group).await)
            }
            None => None,
        };
        CheckOutcome::Deleted { group }
    }

    fn check_failed(
        &self,
        leaf: LeafId,
        stage: CheckStage,
        error: GatewayError,
    ) -> CheckOutcome {
        if error.is_absent() {
            self.inner.registry.remove(leaf);
            info!(%leaf, ?stage, "leaf already gone, entry dropped");
            return CheckOutcome::AlreadyGone;
        }
        self.inner.registry.release(leaf);
        warn!(%leaf, ?stage, %error, "empty-check abandoned, leaf stays tracked");
        CheckOutcome::Abandoned { stage, error }
    }

    /// Delete `group` if it has no members left. Never scheduled on its own;
    /// runs only after a confirmed leaf deletion.
    pub async fn maybe_delete_group(&self, scope: ScopeId, group: GroupId) -> GroupOutcome {
        let _structure = self.lock_scope(scope).await;
        let gateway = &self.inner.gateway;

        debug!(%group, "checking whether group has to be removed");
        let members = match gateway.list_group_members(group).await {
            Ok(members) => members.len(),
            Err(error) => return group_failed(group, error),
        };
        if members > 0 {
            debug!(%group, members, "group is not empty");
            return GroupOutcome::Occupied { group, members };
        }
        match gateway.delete_group(group).await {
            Ok(()) => {
                info!(%group, "group deleted");
                GroupOutcome::Deleted(group)
            }
            Err(error) => group_failed(group, error),
        }
    }
}

fn group_failed(group: GroupId, error: GatewayError) -> GroupOutcome {
    if error.is_absent() {
        debug!(%group, "group already gone");
        return GroupOutcome::AlreadyGone(group);
    }
    warn!(%group, %error, "group cleanup abandoned");
    GroupOutcome::Abandoned { group, error }
}

fn dispatch_check<G: ResourceGateway>(
    owner: &Weak<SchedulerInner<G>>,
    leaf: LeafId,
) -> ControlFlow<()> {
    let Some(inner) = owner.upgrade() else {
        return ControlFlow::Break(());
    };
    let scheduler = ReclamationScheduler { inner };
    tokio::spawn(async move {
        let outcome = scheduler.perform_check(leaf).await;
        debug!(%leaf, ?outcome, "empty-check finished");
    });
    ControlFlow::Continue(())
}
