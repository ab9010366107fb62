//! Identifier and name types for the embedded graph

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(id: u64) -> Self {
                $name(id)
            }

            pub fn as_u64(&self) -> u64 {
                self.0
            }

            /// Slot in the store arena
            pub(crate) fn slot(&self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                $name(id)
            }
        }
    };
}

macro_rules! graph_name {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                $name(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

arena_id!(
    /// Node handle, stable for the lifetime of a store and its snapshots
    NodeId
);
arena_id!(
    /// Edge handle
    EdgeId
);
graph_name!(
    /// Node label such as `Trial` or `Intervention`
    Label
);
graph_name!(
    /// Relationship type such as `SPONSORS`
    EdgeType
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids() {
        let id = NodeId::new(7);
        assert_eq!(id.as_u64(), 7);
        assert_eq!(id.slot(), 7);
        assert_eq!(id.to_string(), "NodeId(7)");
        assert_eq!(EdgeId::from(3).to_string(), "EdgeId(3)");
        assert!(NodeId::new(1) < NodeId::new(2));
    }

    #[test]
    fn test_names() {
        let label = Label::new("Trial");
        assert_eq!(label.as_str(), "Trial");
        assert_eq!(label, Label::from("Trial"));
        assert_eq!(EdgeType::from("HAS_ARM".to_string()).to_string(), "HAS_ARM");
    }
}
