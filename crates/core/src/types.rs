use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create a new instance from a raw id value.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Return the raw id value.
            #[must_use]
            pub const fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }
    };
}

newtype_id!(RuleId, "Identifies an action rule.");
newtype_id!(ConditionId, "Identifies a filter condition within a rule.");
newtype_id!(OperationId, "Identifies an operation within a rule.");
newtype_id!(
    EntityId,
    "Identifies an externally owned entity (host, user, script, ...)."
);

/// Kinds of externally owned entities an action rule can reference.
///
/// Every referenced id is existence/permission checked in one batched
/// lookup per kind through the access-control collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Host,
    HostGroup,
    Template,
    Trigger,
    User,
    UserGroup,
    Script,
    MediaType,
    DiscoveryRule,
    DiscoveryCheck,
    Proxy,
}

impl EntityKind {
    /// Human-readable kind name used in error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::HostGroup => "host group",
            Self::Template => "template",
            Self::Trigger => "trigger",
            Self::User => "user",
            Self::UserGroup => "user group",
            Self::Script => "script",
            Self::MediaType => "media type",
            Self::DiscoveryRule => "discovery rule",
            Self::DiscoveryCheck => "discovery check",
            Self::Proxy => "proxy",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrip() {
        let id = RuleId::new(42);
        assert_eq!(id.value(), 42);
        assert_eq!(u64::from(id), 42);
        assert_eq!(RuleId::from(42), id);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn id_serde_transparent() {
        let id = OperationId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let back: OperationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn entity_kind_display() {
        assert_eq!(EntityKind::HostGroup.to_string(), "host group");
        assert_eq!(EntityKind::DiscoveryCheck.to_string(), "discovery check");
    }
}
