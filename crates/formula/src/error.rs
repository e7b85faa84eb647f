use thiserror::Error;

use actum_core::ConditionType;

/// Errors from formula construction, translation, or validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormulaError {
    /// The expression could not be parsed.
    #[error("formula parse error: {0}")]
    Parse(String),

    /// The formula references an id with no matching condition.
    #[error("formula references missing condition \"{0}\"")]
    MissingCondition(String),

    /// A condition is never referenced by the formula.
    #[error("condition \"{0}\" is not used by the formula")]
    UnusedCondition(String),

    /// Two conditions carry the same formula id.
    #[error("duplicate formula id \"{0}\"")]
    DuplicateFormulaId(String),

    /// A condition lacks a formula id while the eval type is a custom
    /// expression.
    #[error("condition is missing a formula id")]
    MissingFormulaId,

    /// A formula was supplied for an eval type that derives it.
    #[error("a formula may only be supplied with the custom-expression eval type")]
    UnexpectedFormula,

    /// The custom-expression eval type requires a formula.
    #[error("the custom-expression eval type requires a formula")]
    MissingFormula,

    /// Two distinct trigger conditions are combined with AND; such a
    /// conjunction can never be satisfied.
    #[error("conditions for distinct triggers \"{0}\" and \"{1}\" cannot be combined with AND")]
    ConflictingTriggers(String, String),

    /// A condition value is empty.
    #[error("empty value for {0:?} condition")]
    EmptyConditionValue(ConditionType),

    /// A tag-value condition lacks its tag name.
    #[error("no tag name (value2) given for a tag-value condition")]
    MissingValue2,
}
