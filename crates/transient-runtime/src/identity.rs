//! Opaque identifiers handed out by a [`ResourceGateway`](crate::gateway::ResourceGateway).
//!
//! The runtime never holds resource handles, only these ids. Anything else
//! about a resource is looked up through the gateway when it is needed.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

opaque_id!(
    /// Owning scope (a guild, a tenant) that groups and leaves live in.
    ScopeId,
    "scope-"
);
opaque_id!(
    /// Parent container of leaves (a category).
    GroupId,
    "group-"
);
opaque_id!(
    /// The ephemeral resource being reclaimed (a voice channel).
    LeafId,
    "leaf-"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_kind_prefix() {
        assert_eq!(LeafId(7).to_string(), "leaf-7");
        assert_eq!(GroupId::from(3).to_string(), "group-3");
        assert_eq!(ScopeId(1).get(), 1);
    }
}
