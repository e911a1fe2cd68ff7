//! # transient-runtime
//!
//! Creates channels on demand and reclaims them once they stay empty.
//!
//! A leaf (a voice channel) is created under an optional group (a category)
//! through a [`ResourceGateway`]. From then on the [`ReclamationScheduler`]
//! checks it once per grace period: an occupied leaf is re-checked later, an
//! empty one is deleted, followed by its group if that is now empty too.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use transient_runtime::{InMemoryGateway, ReclaimConfig, Reclaimer, ScopeId};
//!
//! # async fn demo() -> Result<(), transient_runtime::RuntimeError> {
//! let reclaimer = Reclaimer::start(Arc::new(InMemoryGateway::new()), ReclaimConfig::default());
//! let leaf = reclaimer
//!     .request_leaf_creation(ScopeId(1), "standup", Some("Team A"))
//!     .await?;
//! println!("created {} until at least {:?}", leaf.id, leaf.deadline);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod gateway;
pub mod identity;
pub mod reclaim;

pub use error::{GatewayError, ResourceKind, RuntimeError};
pub use gateway::{GatewayOp, GroupSummary, InMemoryGateway, ResourceGateway};
pub use identity::{GroupId, LeafId, ScopeId};
pub use reclaim::{
    CheckOutcome, CheckStage, CreationCoordinator, GroupOutcome, GroupRef, LeafHandle,
    LifecycleRegistry, ReclaimConfig, ReclamationScheduler, Reclaimer,
};
