//! Resource gateway façade consumed by the reclamation runtime.

mod memory;

pub use memory::{GatewayOp, GroupRecord, InMemoryGateway, LeafRecord};

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::identity::{GroupId, LeafId, ScopeId};

/// A group as returned by [`ResourceGateway::list_groups`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSummary {
    pub id: GroupId,
    pub name: String,
}

/// Create/delete/list capability over leaves and groups.
///
/// Every call may suspend. Implementations report a resource that no longer
/// exists as [`GatewayError::NotFound`]; the runtime treats that as a lost race
/// rather than a failure.
#[async_trait]
pub trait ResourceGateway: Send + Sync + 'static {
    /// Create a group named `name` in `scope`. Does not deduplicate names.
    async fn create_group(&self, scope: ScopeId, name: &str) -> Result<GroupId, GatewayError>;

    /// All groups currently in `scope`.
    async fn list_groups(&self, scope: ScopeId) -> Result<Vec<GroupSummary>, GatewayError>;

    /// Create a leaf in `scope`, under `parent` when given.
    async fn create_leaf(
        &self,
        scope: ScopeId,
        name: &str,
        parent: Option<GroupId>,
    ) -> Result<LeafId, GatewayError>;

    async fn delete_leaf(&self, leaf: LeafId) -> Result<(), GatewayError>;

    /// Number of occupants currently in the leaf. Never cached by callers.
    async fn occupancy_of(&self, leaf: LeafId) -> Result<usize, GatewayError>;

    /// Parent group of the leaf, if any.
    async fn parent_of(&self, leaf: LeafId) -> Result<Option<GroupId>, GatewayError>;

    async fn list_group_members(&self, group: GroupId) -> Result<Vec<LeafId>, GatewayError>;

    async fn delete_group(&self, group: GroupId) -> Result<(), GatewayError>;
}
