//! Collaborator traits for the Actum engine: a transactional rule store
//! and a batched access-control check, plus the typed change sets the
//! store applies.

pub mod access;
pub mod changes;
pub mod error;
pub mod store;

pub use access::AccessControl;
pub use changes::{
    ChangeSet, ConditionReplacement, MembershipDelta, OperationInsert, OperationPatch,
    PayloadChange, RulePatch,
};
pub use error::StateError;
pub use store::{IdKind, RuleQuery, RuleStore};
