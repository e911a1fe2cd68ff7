//! Creation coordinator: group lookup-or-create, leaf creation, registration.

use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::gateway::ResourceGateway;
use crate::identity::ScopeId;

use super::models::{GroupRef, LeafHandle};
use super::scheduler::ReclamationScheduler;

pub struct CreationCoordinator<G: ResourceGateway> {
    scheduler: ReclamationScheduler<G>,
}

impl<G: ResourceGateway> Clone for CreationCoordinator<G> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<G: ResourceGateway> CreationCoordinator<G> {
    pub fn new(scheduler: ReclamationScheduler<G>) -> Self {
        Self { scheduler }
    }

    /// Create `leaf_name` in `scope`, under the group called `group_name` when given.
    ///
    /// An existing group with exactly that name is reused; otherwise one is
    /// created. The new leaf is registered for reclamation and its first check
    /// is armed one grace period out. Gateway failures are returned unchanged.
    pub async fn create_leaf(
        &self,
        scope: ScopeId,
        leaf_name: &str,
        group_name: Option<&str>,
    ) -> Result<LeafHandle> {
        require_name("leaf", leaf_name)?;
        if let Some(name) = group_name {
            require_name("group", name)?;
        }
        if !self.scheduler.is_running() {
            return Err(RuntimeError::SchedulerStopped);
        }

        let (id, group) = {
            let _structure = self.scheduler.lock_scope(scope).await;
            let group = match group_name {
                Some(name) => Some(self.resolve_group(scope, name).await?),
                None => None,
            };
            debug!(%scope, leaf_name, group = group_name, "creating leaf");
            let id = self
                .scheduler
                .gateway()
                .create_leaf(scope, leaf_name, group.as_ref().map(|g| g.id))
                .await?;
            (id, group)
        };

        let deadline = match self.scheduler.track(scope, id) {
            Ok(deadline) => deadline,
            Err(error) => {
                warn!(%scope, leaf = %id, %error, "leaf created but not tracked, deleting it");
                if let Err(delete_error) = self.scheduler.gateway().delete_leaf(id).await {
                    warn!(leaf = %id, error = %delete_error, "untracked leaf left behind");
                }
                return Err(error);
            }
        };
        info!(%scope, leaf = %id, leaf_name, group = group_name, "leaf created");
        Ok(LeafHandle {
            id,
            scope,
            name: leaf_name.to_string(),
            group,
            deadline,
        })
    }

    async fn resolve_group(&self, scope: ScopeId, name: &str) -> Result<GroupRef> {
        let gateway = self.scheduler.gateway();
        let existing = gateway
            .list_groups(scope)
            .await?
            .into_iter()
            .find(|group| group.name == name);
        if let Some(group) = existing {
            info!(%scope, group = %group.id, name, "group already exists, reusing it");
            return Ok(GroupRef {
                id: group.id,
                name: group.name,
                created: false,
            });
        }

        let id = gateway.create_group(scope, name).await?;
        debug!(%scope, group = %id, name, "group created");
        Ok(GroupRef {
            id,
            name: name.to_string(),
            created: true,
        })
    }
}

fn require_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RuntimeError::InvalidRequest(format!(
            "{kind} name must not be empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_test::assert_ok;

    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::{GatewayOp, InMemoryGateway};
    use crate::reclaim::scheduler::ReclaimConfig;

    const SCOPE: ScopeId = ScopeId(7);

    fn coordinator_with(
        gateway: InMemoryGateway,
    ) -> (Arc<InMemoryGateway>, CreationCoordinator<InMemoryGateway>) {
        let gateway = Arc::new(gateway);
        let scheduler = ReclamationScheduler::start(gateway.clone(), ReclaimConfig::default());
        (gateway, CreationCoordinator::new(scheduler))
    }

    #[tokio::test(start_paused = true)]
    async fn creates_group_then_leaf_and_registers_it() {
        let (gateway, coordinator) = coordinator_with(InMemoryGateway::new());
        let handle = assert_ok!(coordinator.create_leaf(SCOPE, "standup", Some("Team A")).await);

        let group = handle.group.clone().expect("group resolved");
        assert!(group.created);
        assert_eq!(group.name, "Team A");
        assert_eq!(
            gateway.leaf(handle.id).and_then(|l| l.parent),
            Some(group.id)
        );
        assert_eq!(
            coordinator.scheduler.registry().deadline_of(handle.id),
            Some(handle.deadline)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn existing_group_name_is_reused() {
        let (gateway, coordinator) = coordinator_with(InMemoryGateway::new());
        let first = assert_ok!(coordinator.create_leaf(SCOPE, "a", Some("Team A")).await);
        let second = assert_ok!(coordinator.create_leaf(SCOPE, "b", Some("Team A")).await);

        let second_group = second.group.expect("group");
        assert!(!second_group.created);
        assert_eq!(Some(second_group.id), first.group.map(|g| g.id));
        assert_eq!(gateway.groups_named(SCOPE, "Team A").len(), 1);
        assert_eq!(gateway.calls(GatewayOp::CreateGroup), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn group_names_match_case_sensitively() {
        let (gateway, coordinator) = coordinator_with(InMemoryGateway::new());
        assert_ok!(coordinator.create_leaf(SCOPE, "a", Some("Team A")).await);
        assert_ok!(coordinator.create_leaf(SCOPE, "b", Some("team a")).await);
        assert_eq!(gateway.groups(SCOPE).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn leaf_without_group_lands_at_scope_root() {
        let (gateway, coordinator) = coordinator_with(InMemoryGateway::new());
        let handle = assert_ok!(coordinator.create_leaf(SCOPE, "lobby", None).await);
        assert!(handle.group.is_none());
        assert_eq!(gateway.leaf(handle.id).map(|l| l.parent), Some(None));
        assert_eq!(gateway.calls(GatewayOp::ListGroups), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_names_are_rejected_before_touching_the_gateway() {
        let (gateway, coordinator) = coordinator_with(InMemoryGateway::new());
        let err = coordinator.create_leaf(SCOPE, "  ", None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidRequest(_)));
        let err = coordinator.create_leaf(SCOPE, "a", Some("")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidRequest(_)));
        assert_eq!(gateway.calls(GatewayOp::ListGroups), 0);
        assert_eq!(gateway.calls(GatewayOp::CreateLeaf), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_failure_fails_the_request_and_registers_nothing() {
        let (gateway, coordinator) = coordinator_with(InMemoryGateway::new());
        gateway.inject_failure(
            GatewayOp::CreateLeaf,
            GatewayError::PermissionDenied("manage channels".into()),
        );

        let err = coordinator.create_leaf(SCOPE, "a", None).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Gateway(GatewayError::PermissionDenied(_))
        ));
        assert!(coordinator.scheduler.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_for_a_new_group_create_it_once() {
        let (gateway, coordinator) =
            coordinator_with(InMemoryGateway::new().with_latency(Duration::from_millis(10)));

        let (a, b) = tokio::join!(
            coordinator.create_leaf(SCOPE, "a", Some("Team B")),
            coordinator.create_leaf(SCOPE, "b", Some("Team B"))
        );
        let (a, b) = (assert_ok!(a), assert_ok!(b));

        assert_eq!(gateway.groups_named(SCOPE, "Team B").len(), 1);
        assert_eq!(a.group.map(|g| g.id), b.group.map(|g| g.id));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_creation_removes_the_untracked_leaf() {
        let (gateway, coordinator) =
            coordinator_with(InMemoryGateway::new().with_latency(Duration::from_millis(10)));

        let request = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.create_leaf(SCOPE, "a", None).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        coordinator.scheduler.shutdown();

        let err = request.await.expect("request task").unwrap_err();
        assert!(matches!(err, RuntimeError::SchedulerStopped));
        assert!(gateway.leaves(SCOPE).is_empty());
        assert_eq!(gateway.calls(GatewayOp::DeleteLeaf), 1);
        assert!(coordinator.scheduler.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn creation_in_one_scope_does_not_wait_for_another() {
        let (gateway, coordinator) = coordinator_with(InMemoryGateway::new());
        let _busy = coordinator.scheduler.lock_scope(SCOPE).await;

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            coordinator.create_leaf(ScopeId(8), "a", Some("Team A")),
        );
        let handle = assert_ok!(assert_ok!(other.await));
        assert_eq!(handle.scope, ScopeId(8));

        let blocked = tokio::time::timeout(
            Duration::from_secs(1),
            coordinator.create_leaf(SCOPE, "b", Some("Team A")),
        );
        assert!(blocked.await.is_err());
        assert!(gateway.leaves(SCOPE).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_scheduler_refuses_creation() {
        let (gateway, coordinator) = coordinator_with(InMemoryGateway::new());
        coordinator.scheduler.shutdown();
        let err = coordinator.create_leaf(SCOPE, "a", None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::SchedulerStopped));
        assert!(gateway.leaves(SCOPE).is_empty());
    }
}
