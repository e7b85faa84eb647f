//! Write-path validation of submitted filters.
//!
//! Syntax errors, references to missing conditions, unused conditions, and
//! the semantic trigger-conjunction check are all caught here, before any
//! id has been allocated.

use std::collections::HashMap;

use actum_core::{ConditionDraft, ConditionOperator, ConditionType, EvalType, FilterDraft};

use crate::error::FormulaError;
use crate::parser::parse_formula;

/// Validate a submitted filter: per-condition structural rules, formula
/// presence rules per eval type, custom expression syntax and reference
/// consistency, and the trigger-conjunction semantic check.
pub fn validate_filter(filter: &FilterDraft) -> Result<(), FormulaError> {
    validate_conditions(&filter.conditions)?;

    match filter.eval_type {
        EvalType::CustomExpression => {
            let formula = filter
                .formula
                .as_deref()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .ok_or(FormulaError::MissingFormula)?;
            validate_custom(formula, &filter.conditions)
        }
        _ => {
            // Derived formulas are never accepted as input.
            if filter
                .formula
                .as_deref()
                .is_some_and(|f| !f.trim().is_empty())
            {
                return Err(FormulaError::UnexpectedFormula);
            }
            validate_generated(filter.eval_type, &filter.conditions)
        }
    }
}

/// Per-condition structural rules, independent of the eval type.
fn validate_conditions(conditions: &[ConditionDraft]) -> Result<(), FormulaError> {
    for condition in conditions {
        if condition.condition_type == ConditionType::EventTagValue {
            if condition.value2.trim().is_empty() {
                return Err(FormulaError::MissingValue2);
            }
        } else if condition.value.trim().is_empty() {
            return Err(FormulaError::EmptyConditionValue(condition.condition_type));
        }
    }
    Ok(())
}

/// Validate a caller-supplied custom expression against its condition set.
fn validate_custom(formula: &str, conditions: &[ConditionDraft]) -> Result<(), FormulaError> {
    let mut by_letter: HashMap<&str, &ConditionDraft> = HashMap::with_capacity(conditions.len());
    for condition in conditions {
        let letter = condition
            .formula_id
            .as_deref()
            .filter(|l| !l.is_empty())
            .ok_or(FormulaError::MissingFormulaId)?;
        if by_letter.insert(letter, condition).is_some() {
            return Err(FormulaError::DuplicateFormulaId(letter.to_owned()));
        }
    }

    let expr = parse_formula(formula)?;

    let refs = expr.refs();
    for token in &refs {
        if token.starts_with('{') {
            return Err(FormulaError::Parse(format!(
                "submitted formulas must reference conditions by letter, found {token}"
            )));
        }
        if !by_letter.contains_key(*token) {
            return Err(FormulaError::MissingCondition((*token).to_owned()));
        }
    }
    for letter in by_letter.keys() {
        if !refs.contains(letter) {
            return Err(FormulaError::UnusedCondition((*letter).to_owned()));
        }
    }

    // Semantic check: two distinct trigger-identity conditions joined by
    // AND can never hold at once.
    for group in expr.conjunct_groups() {
        let triggers: Vec<&ConditionDraft> = group
            .iter()
            .filter_map(|token| by_letter.get(token).copied())
            .filter(|c| is_trigger_identity(c))
            .collect();
        check_distinct_triggers(&triggers)?;
    }

    Ok(())
}

/// Semantic validation for derived eval types. Only [`EvalType::And`] can
/// conjoin two trigger-identity conditions; OR and AND-OR group them
/// disjunctively.
fn validate_generated(
    eval_type: EvalType,
    conditions: &[ConditionDraft],
) -> Result<(), FormulaError> {
    if eval_type != EvalType::And {
        return Ok(());
    }
    let triggers: Vec<&ConditionDraft> = conditions
        .iter()
        .filter(|c| is_trigger_identity(c))
        .collect();
    check_distinct_triggers(&triggers)
}

fn is_trigger_identity(condition: &ConditionDraft) -> bool {
    condition.condition_type == ConditionType::Trigger
        && condition.operator == ConditionOperator::Equal
}

fn check_distinct_triggers(triggers: &[&ConditionDraft]) -> Result<(), FormulaError> {
    for pair in triggers.windows(2) {
        if pair[0].value != pair[1].value {
            return Err(FormulaError::ConflictingTriggers(
                pair[0].value.clone(),
                pair[1].value.clone(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(
        condition_type: ConditionType,
        operator: ConditionOperator,
        value: &str,
        formula_id: Option<&str>,
    ) -> ConditionDraft {
        ConditionDraft {
            condition_type,
            operator,
            value: value.to_owned(),
            value2: String::new(),
            formula_id: formula_id.map(str::to_owned),
        }
    }

    fn custom_filter(formula: &str, conditions: Vec<ConditionDraft>) -> FilterDraft {
        FilterDraft {
            eval_type: EvalType::CustomExpression,
            formula: Some(formula.to_owned()),
            conditions,
        }
    }

    #[test]
    fn accepts_well_formed_custom_expression() {
        let filter = custom_filter(
            "(A or B) and C",
            vec![
                draft(ConditionType::HostGroup, ConditionOperator::Equal, "5", Some("A")),
                draft(ConditionType::HostGroup, ConditionOperator::Equal, "7", Some("B")),
                draft(ConditionType::Severity, ConditionOperator::GreaterEqual, "3", Some("C")),
            ],
        );
        assert_eq!(validate_filter(&filter), Ok(()));
    }

    #[test]
    fn rejects_missing_condition_reference() {
        let filter = custom_filter(
            "A and B",
            vec![draft(ConditionType::Host, ConditionOperator::Equal, "1", Some("A"))],
        );
        assert_eq!(
            validate_filter(&filter),
            Err(FormulaError::MissingCondition("B".to_owned()))
        );
    }

    #[test]
    fn rejects_unused_condition() {
        let filter = custom_filter(
            "A",
            vec![
                draft(ConditionType::Host, ConditionOperator::Equal, "1", Some("A")),
                draft(ConditionType::Host, ConditionOperator::Equal, "2", Some("B")),
            ],
        );
        assert_eq!(
            validate_filter(&filter),
            Err(FormulaError::UnusedCondition("B".to_owned()))
        );
    }

    #[test]
    fn rejects_conjoined_distinct_triggers() {
        let filter = custom_filter(
            "A and B",
            vec![
                draft(ConditionType::Trigger, ConditionOperator::Equal, "100", Some("A")),
                draft(ConditionType::Trigger, ConditionOperator::Equal, "200", Some("B")),
            ],
        );
        assert_eq!(
            validate_filter(&filter),
            Err(FormulaError::ConflictingTriggers(
                "100".to_owned(),
                "200".to_owned()
            ))
        );
    }

    #[test]
    fn allows_distinct_triggers_across_or() {
        let filter = custom_filter(
            "A or B",
            vec![
                draft(ConditionType::Trigger, ConditionOperator::Equal, "100", Some("A")),
                draft(ConditionType::Trigger, ConditionOperator::Equal, "200", Some("B")),
            ],
        );
        assert_eq!(validate_filter(&filter), Ok(()));
    }

    #[test]
    fn allows_negated_triggers_in_conjunction() {
        let filter = custom_filter(
            "A and B",
            vec![
                draft(ConditionType::Trigger, ConditionOperator::NotEqual, "100", Some("A")),
                draft(ConditionType::Trigger, ConditionOperator::NotEqual, "200", Some("B")),
            ],
        );
        assert_eq!(validate_filter(&filter), Ok(()));
    }

    #[test]
    fn generated_and_rejects_distinct_triggers() {
        let filter = FilterDraft {
            eval_type: EvalType::And,
            formula: None,
            conditions: vec![
                draft(ConditionType::Trigger, ConditionOperator::Equal, "100", None),
                draft(ConditionType::Trigger, ConditionOperator::Equal, "200", None),
            ],
        };
        assert!(matches!(
            validate_filter(&filter),
            Err(FormulaError::ConflictingTriggers(_, _))
        ));
    }

    #[test]
    fn generated_and_or_allows_distinct_triggers() {
        let filter = FilterDraft {
            eval_type: EvalType::AndOr,
            formula: None,
            conditions: vec![
                draft(ConditionType::Trigger, ConditionOperator::Equal, "100", None),
                draft(ConditionType::Trigger, ConditionOperator::Equal, "200", None),
            ],
        };
        assert_eq!(validate_filter(&filter), Ok(()));
    }

    #[test]
    fn rejects_formula_for_derived_eval_type() {
        let filter = FilterDraft {
            eval_type: EvalType::Or,
            formula: Some("A or B".to_owned()),
            conditions: vec![draft(
                ConditionType::Host,
                ConditionOperator::Equal,
                "1",
                None,
            )],
        };
        assert_eq!(validate_filter(&filter), Err(FormulaError::UnexpectedFormula));
    }

    #[test]
    fn rejects_tag_value_without_tag_name() {
        let filter = FilterDraft {
            eval_type: EvalType::Or,
            formula: None,
            conditions: vec![draft(
                ConditionType::EventTagValue,
                ConditionOperator::Equal,
                "production",
                None,
            )],
        };
        assert_eq!(validate_filter(&filter), Err(FormulaError::MissingValue2));
    }

    #[test]
    fn rejects_duplicate_formula_ids() {
        let filter = custom_filter(
            "A",
            vec![
                draft(ConditionType::Host, ConditionOperator::Equal, "1", Some("A")),
                draft(ConditionType::Host, ConditionOperator::Equal, "2", Some("A")),
            ],
        );
        assert_eq!(
            validate_filter(&filter),
            Err(FormulaError::DuplicateFormulaId("A".to_owned()))
        );
    }

    #[test]
    fn rejects_condition_without_formula_id() {
        let filter = custom_filter(
            "A",
            vec![draft(ConditionType::Host, ConditionOperator::Equal, "1", None)],
        );
        assert_eq!(validate_filter(&filter), Err(FormulaError::MissingFormulaId));
    }
}
