//! Action rule service for Actum.
//!
//! Validates submitted rules against the operation legality matrix and
//! per-type structural rules, reconciles nested child collections on
//! update, and persists every call as one atomic change set through the
//! [`actum_state::RuleStore`] collaborator.

pub mod error;
pub mod matrix;
pub mod reconcile;
pub mod service;
pub mod validator;

pub use error::ActionError;
pub use matrix::{is_legal, legal_operation_types};
pub use reconcile::{diff_identity, diff_membership, IdentityChange};
pub use service::ActionService;
pub use validator::EntityRefs;
