//! Error types shared by the gateway contract and the reclamation runtime.

use std::fmt;

use thiserror::Error;

/// Kind of resource a gateway call was acting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Group,
    Leaf,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Group => "group",
            ResourceKind::Leaf => "leaf",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`ResourceGateway`](crate::gateway::ResourceGateway).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The resource is already gone. Reclamation treats this as a race it lost,
    /// not as a failure.
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: u64 },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("gateway transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    pub fn leaf_not_found(id: impl Into<u64>) -> Self {
        GatewayError::NotFound {
            kind: ResourceKind::Leaf,
            id: id.into(),
        }
    }

    pub fn group_not_found(id: impl Into<u64>) -> Self {
        GatewayError::NotFound {
            kind: ResourceKind::Group,
            id: id.into(),
        }
    }

    /// True when the target no longer exists.
    pub fn is_absent(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}

/// Errors surfaced to callers of the runtime (the command surface).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("reclamation scheduler has been shut down")]
    SchedulerStopped,
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LeafId;

    #[test]
    fn not_found_is_absent_and_names_the_kind() {
        let err = GatewayError::leaf_not_found(LeafId(9));
        assert!(err.is_absent());
        assert_eq!(err.to_string(), "leaf not found: 9");
        assert!(!GatewayError::Transport("reset".into()).is_absent());
    }

    #[test]
    fn gateway_errors_propagate_unchanged_into_runtime_errors() {
        let err: RuntimeError = GatewayError::PermissionDenied("manage channels".into()).into();
        assert!(matches!(
            err,
            RuntimeError::Gateway(GatewayError::PermissionDenied(ref p)) if p == "manage channels"
        ));
    }
}
