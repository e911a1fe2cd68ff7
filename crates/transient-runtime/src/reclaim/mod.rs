//! Reclamation runtime: lifecycle registry, empty-check scheduler and creation
//! coordinator, bundled behind [`Reclaimer`].

mod coordinator;
mod models;
mod registry;
mod scheduler;
mod timer;

use std::sync::Arc;

pub use coordinator::CreationCoordinator;
pub use models::{CheckOutcome, CheckStage, GroupOutcome, GroupRef, LeafHandle};
pub use registry::{CheckGate, LifecycleRegistry, ReclamationEntry};
pub use scheduler::{ReclaimConfig, ReclamationScheduler};

use crate::error::Result;
use crate::gateway::ResourceGateway;
use crate::identity::{LeafId, ScopeId};

/// Entry point for the command surface: creation requests in, automatic
/// reclamation out.
pub struct Reclaimer<G: ResourceGateway> {
    scheduler: ReclamationScheduler<G>,
    coordinator: CreationCoordinator<G>,
}

impl<G: ResourceGateway> Clone for Reclaimer<G> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<G: ResourceGateway> Reclaimer<G> {
    /// Must be called from within a tokio runtime.
    pub fn start(gateway: Arc<G>, config: ReclaimConfig) -> Self {
        let scheduler = ReclamationScheduler::start(gateway, config);
        let coordinator = CreationCoordinator::new(scheduler.clone());
        Self {
            scheduler,
            coordinator,
        }
    }

    pub async fn request_leaf_creation(
        &self,
        scope: ScopeId,
        leaf_name: &str,
        group_name: Option<&str>,
    ) -> Result<LeafHandle> {
        self.coordinator
            .create_leaf(scope, leaf_name, group_name)
            .await
    }

    pub fn scheduler(&self) -> &ReclamationScheduler<G> {
        &self.scheduler
    }

    pub fn gateway(&self) -> &Arc<G> {
        self.scheduler.gateway()
    }

    pub fn tracked(&self) -> Vec<LeafId> {
        self.scheduler.registry().tracked()
    }

    pub fn rearm(&self, leaf: LeafId) -> Result<bool> {
        self.scheduler.rearm(leaf)
    }

    pub fn sweep(&self) -> Result<usize> {
        self.scheduler.sweep()
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
