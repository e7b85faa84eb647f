use thiserror::Error;

use actum_core::EntityKind;
use actum_formula::FormulaError;
use actum_state::StateError;

/// Errors from the action rule service.
///
/// Every error aborts the whole batch call before anything is committed;
/// the variants distinguish how a caller should map the failure: bad
/// request, forbidden, or conflict against loaded state.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A submitted field is missing, malformed, or out of range.
    #[error("parameter error: {0}")]
    Parameter(String),

    /// A referenced object is forbidden or does not exist.
    #[error("permission error: {0}")]
    Permission(String),

    /// A submitted reference contradicts the loaded state, e.g. an
    /// operation id that does not belong to the rule being updated.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// The persistence backend failed.
    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl ActionError {
    /// Permission failure for a referenced entity kind. Deliberately does
    /// not say which: "forbidden" and "nonexistent" are indistinguishable
    /// to the caller.
    #[must_use]
    pub fn forbidden(kind: EntityKind) -> Self {
        Self::Permission(format!(
            "no permissions to referenced {kind} object, or it does not exist"
        ))
    }

    /// Permission failure for a rule id named by an update or delete.
    #[must_use]
    pub fn forbidden_rule(id: actum_core::RuleId) -> Self {
        Self::Permission(format!(
            "no permissions to rule {id}, or it does not exist"
        ))
    }
}

impl From<FormulaError> for ActionError {
    /// Formula failures on the write path are caller mistakes, except the
    /// stale-condition case which only arises against loaded state.
    fn from(err: FormulaError) -> Self {
        match err {
            FormulaError::UnusedCondition(_) | FormulaError::MissingCondition(_) => {
                Self::Integrity(err.to_string())
            }
            _ => Self::Parameter(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_errors_map_to_parameter_or_integrity() {
        let err: ActionError = FormulaError::MissingFormula.into();
        assert!(matches!(err, ActionError::Parameter(_)));

        let err: ActionError = FormulaError::UnusedCondition("B".to_owned()).into();
        assert!(matches!(err, ActionError::Integrity(_)));
    }

    #[test]
    fn permission_message_names_the_kind() {
        let err = ActionError::forbidden(EntityKind::UserGroup);
        assert!(err.to_string().contains("user group"));
    }
}
