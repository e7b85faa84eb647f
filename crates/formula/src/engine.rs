//! Formula construction and letter/id translation.
//!
//! Persisted formulas reference conditions by numeric id in braces
//! (`{17}`); presented formulas use letter ids (`A`, `B`, ... `Z`, `AA`,
//! ...). Letters are a pure function of the effective formula: they are
//! assigned in order of first appearance, after the canonical condition
//! sort fixes the order in which generated formulas reference conditions.

use std::cmp::Ordering;
use std::collections::HashMap;

use actum_core::{Condition, EvalType};

use crate::error::FormulaError;
use crate::parser::parse_formula;

/// Render a zero-based index as a letter id: `0 => A`, `25 => Z`,
/// `26 => AA`, `27 => AB`, `52 => BA`, ...
#[must_use]
pub fn index_to_letter(index: usize) -> String {
    const BASE: usize = 26;
    let mut number = index;
    let mut letters = Vec::new();
    loop {
        letters.push(u8::try_from(number % BASE).unwrap_or(0) + b'A');
        number /= BASE;
        if number == 0 {
            break;
        }
        // Bijective base-26: the second-from-right digit starts at 1.
        number -= 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Canonical condition ordering: condition type, operator, value2, and
/// value, all descending. Generated formulas reference conditions in this
/// order, which makes them independent of submission order.
#[must_use]
pub fn canonical_cmp(a: &Condition, b: &Condition) -> Ordering {
    b.condition_type
        .cmp(&a.condition_type)
        .then_with(|| b.operator.cmp(&a.operator))
        .then_with(|| b.value2.cmp(&a.value2))
        .then_with(|| b.value.cmp(&a.value))
}

/// Sort conditions into the canonical order. Stable, so re-sorting an
/// already-canonical list is a no-op.
pub fn canonical_sort(conditions: &mut [Condition]) {
    conditions.sort_by(canonical_cmp);
}

/// Build the stored (numeric-id) formula for a derived eval type.
///
/// - [`EvalType::Or`] / [`EvalType::And`]: all conditions joined with that
///   connective.
/// - [`EvalType::AndOr`]: conditions grouped by condition type, OR within
///   a group, AND across groups.
/// - [`EvalType::CustomExpression`]: not derivable; the caller owns the
///   stored expression. Returns [`FormulaError::MissingFormula`].
///
/// The condition set is sorted canonically first, so the result does not
/// depend on input ordering. An empty condition set yields an empty
/// formula.
pub fn build_formula(conditions: &[Condition], eval_type: EvalType) -> Result<String, FormulaError> {
    let mut sorted: Vec<&Condition> = conditions.iter().collect();
    sorted.sort_by(|a, b| canonical_cmp(a, b));

    let token = |c: &Condition| format!("{{{}}}", c.id);

    match eval_type {
        EvalType::CustomExpression => Err(FormulaError::MissingFormula),
        EvalType::Or | EvalType::And => {
            let connective = if eval_type == EvalType::Or { " or " } else { " and " };
            Ok(sorted
                .into_iter()
                .map(token)
                .collect::<Vec<_>>()
                .join(connective))
        }
        EvalType::AndOr => {
            // Conditions of one type are adjacent after the canonical sort.
            let mut groups: Vec<Vec<&Condition>> = Vec::new();
            for condition in sorted {
                match groups.last_mut() {
                    Some(group)
                        if group[0].condition_type == condition.condition_type =>
                    {
                        group.push(condition);
                    }
                    _ => groups.push(vec![condition]),
                }
            }
            let many_groups = groups.len() > 1;
            let parts: Vec<String> = groups
                .into_iter()
                .map(|group| {
                    let inner = group
                        .iter()
                        .map(|&c| token(c))
                        .collect::<Vec<_>>()
                        .join(" or ");
                    if many_groups && group.len() > 1 {
                        format!("({inner})")
                    } else {
                        inner
                    }
                })
                .collect();
            Ok(parts.join(" and "))
        }
    }
}

/// Distinct reference tokens of a formula in order of first appearance,
/// each paired with its letter id.
pub fn letter_assignment(formula: &str) -> Result<Vec<(String, String)>, FormulaError> {
    let expr = parse_formula(formula)?;
    let mut assignment: Vec<(String, String)> = Vec::new();
    for token in expr.refs() {
        if !assignment.iter().any(|(t, _)| t == token) {
            let letter = index_to_letter(assignment.len());
            assignment.push((token.to_owned(), letter));
        }
    }
    Ok(assignment)
}

/// Assign letter ids to conditions in canonical order.
///
/// Idempotent: conditions already carrying canonical letters receive the
/// same letters again.
pub fn assign_formula_ids(conditions: &mut [Condition]) {
    let mut order: Vec<usize> = (0..conditions.len()).collect();
    order.sort_by(|&a, &b| canonical_cmp(&conditions[a], &conditions[b]));
    for (position, index) in order.into_iter().enumerate() {
        conditions[index].formula_id = Some(index_to_letter(position));
    }
}

/// Replace letter ids with `{<numeric id>}` tokens, leaving operators,
/// parentheses, and spacing untouched.
///
/// Returns [`FormulaError::MissingCondition`] for a letter absent from the
/// mapping.
pub fn translate_letters_to_ids(
    formula: &str,
    letter_to_id: &HashMap<String, u64>,
) -> Result<String, FormulaError> {
    replace_ref_tokens(formula, |token| {
        letter_to_id.get(token).map(|id| format!("{{{id}}}"))
    })
}

/// Replace `{<numeric id>}` tokens with letter ids, leaving operators,
/// parentheses, and spacing untouched. Inverse of
/// [`translate_letters_to_ids`] under an inverted mapping.
pub fn translate_ids_to_letters(
    formula: &str,
    id_to_letter: &HashMap<u64, String>,
) -> Result<String, FormulaError> {
    replace_ref_tokens(formula, |token| {
        let id: u64 = token.strip_prefix('{')?.strip_suffix('}')?.parse().ok()?;
        id_to_letter.get(&id).cloned()
    })
}

/// Scan a formula and rewrite every reference token through `replace`,
/// copying everything else verbatim. `replace` returning `None` means the
/// token has no mapping.
fn replace_ref_tokens(
    formula: &str,
    mut replace: impl FnMut(&str) -> Option<String>,
) -> Result<String, FormulaError> {
    let mut out = String::with_capacity(formula.len());
    let bytes = formula.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let rest = &formula[i..];
        let token_len = if bytes[i].is_ascii_uppercase() {
            rest.find(|c: char| !c.is_ascii_uppercase())
                .unwrap_or(rest.len())
        } else if bytes[i] == b'{' {
            match rest.find('}') {
                Some(end) => end + 1,
                None => {
                    return Err(FormulaError::Parse(format!(
                        "unterminated id token in {formula:?}"
                    )))
                }
            }
        } else {
            0
        };

        if token_len == 0 {
            // Not a reference token; copy the character through.
            let ch_len = rest.chars().next().map_or(1, char::len_utf8);
            out.push_str(&rest[..ch_len]);
            i += ch_len;
        } else {
            let token = &rest[..token_len];
            match replace(token) {
                Some(replacement) => out.push_str(&replacement),
                None => return Err(FormulaError::MissingCondition(token.to_owned())),
            }
            i += token_len;
        }
    }
    Ok(out)
}

/// Read-path helper: compute the letter rendering of a rule's effective
/// formula and set each condition's transient `formula_id`.
///
/// For [`EvalType::CustomExpression`] the stored numeric formula is used
/// as-is; for the derived eval types the formula is rebuilt from the
/// conditions. Returns the letter formula (empty when there are no
/// conditions).
pub fn resolve_letters(
    conditions: &mut [Condition],
    eval_type: EvalType,
    stored_formula: &str,
) -> Result<String, FormulaError> {
    if conditions.is_empty() {
        return Ok(String::new());
    }

    let numeric = match eval_type {
        EvalType::CustomExpression => stored_formula.to_owned(),
        _ => build_formula(conditions, eval_type)?,
    };

    let assignment = letter_assignment(&numeric)?;
    let mut id_to_letter: HashMap<u64, String> = HashMap::with_capacity(assignment.len());
    for (token, letter) in &assignment {
        let id: u64 = token
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| FormulaError::Parse(format!("non-numeric stored token {token:?}")))?;
        id_to_letter.insert(id, letter.clone());
    }

    for condition in conditions.iter_mut() {
        match id_to_letter.get(&condition.id.value()) {
            Some(letter) => condition.formula_id = Some(letter.clone()),
            None => {
                return Err(FormulaError::UnusedCondition(condition.id.to_string()));
            }
        }
    }

    translate_ids_to_letters(&numeric, &id_to_letter)
}

#[cfg(test)]
mod tests {
    use actum_core::{ConditionId, ConditionOperator, ConditionType};

    use super::*;

    fn condition(id: u64, condition_type: ConditionType, value: &str) -> Condition {
        Condition {
            id: ConditionId::new(id),
            condition_type,
            operator: ConditionOperator::Equal,
            value: value.to_owned(),
            value2: String::new(),
            formula_id: None,
        }
    }

    #[test]
    fn letters_follow_bijective_base26() {
        assert_eq!(index_to_letter(0), "A");
        assert_eq!(index_to_letter(25), "Z");
        assert_eq!(index_to_letter(26), "AA");
        assert_eq!(index_to_letter(27), "AB");
        assert_eq!(index_to_letter(52), "BA");
        assert_eq!(index_to_letter(701), "ZZ");
        assert_eq!(index_to_letter(702), "AAA");
    }

    #[test]
    fn build_formula_is_order_independent() {
        let a = condition(1, ConditionType::HostGroup, "5");
        let b = condition(2, ConditionType::HostGroup, "7");
        let c = condition(3, ConditionType::Severity, "3");

        for eval_type in [EvalType::Or, EvalType::And, EvalType::AndOr] {
            let forward = build_formula(&[a.clone(), b.clone(), c.clone()], eval_type).unwrap();
            let shuffled = build_formula(&[c.clone(), a.clone(), b.clone()], eval_type).unwrap();
            assert_eq!(forward, shuffled, "{eval_type:?}");
        }
    }

    #[test]
    fn and_or_groups_by_condition_type() {
        let conditions = vec![
            condition(1, ConditionType::HostGroup, "5"),
            condition(2, ConditionType::HostGroup, "7"),
            condition(3, ConditionType::Severity, "3"),
        ];
        let formula = build_formula(&conditions, EvalType::AndOr).unwrap();
        // Canonical sort is descending, so the severity group leads and the
        // two host-group conditions are OR-ed inside one parenthesised group.
        assert_eq!(formula, "{3} and ({2} or {1})");
    }

    #[test]
    fn and_or_single_group_has_no_parens() {
        let conditions = vec![
            condition(1, ConditionType::HostGroup, "5"),
            condition(2, ConditionType::HostGroup, "7"),
        ];
        let formula = build_formula(&conditions, EvalType::AndOr).unwrap();
        assert_eq!(formula, "{2} or {1}");
    }

    #[test]
    fn assign_formula_ids_is_idempotent() {
        let mut conditions = vec![
            condition(1, ConditionType::HostGroup, "5"),
            condition(2, ConditionType::Severity, "3"),
            condition(3, ConditionType::HostGroup, "7"),
        ];
        assign_formula_ids(&mut conditions);
        let first: Vec<_> = conditions.iter().map(|c| c.formula_id.clone()).collect();

        // Re-sort into canonical order and assign again: same letters.
        canonical_sort(&mut conditions);
        assign_formula_ids(&mut conditions);
        let mut by_id: Vec<_> = conditions
            .iter()
            .map(|c| (c.id.value(), c.formula_id.clone()))
            .collect();
        by_id.sort_by_key(|(id, _)| *id);
        assert_eq!(
            first,
            by_id.into_iter().map(|(_, letter)| letter).collect::<Vec<_>>()
        );
    }

    #[test]
    fn translation_round_trips_exactly() {
        let formula = "(A or B)  and ( C or A )";
        let letter_to_id: HashMap<String, u64> =
            [("A".to_owned(), 10), ("B".to_owned(), 20), ("C".to_owned(), 30)]
                .into_iter()
                .collect();
        let numeric = translate_letters_to_ids(formula, &letter_to_id).unwrap();
        assert_eq!(numeric, "({10} or {20})  and ( {30} or {10} )");

        let id_to_letter: HashMap<u64, String> = letter_to_id
            .into_iter()
            .map(|(letter, id)| (id, letter))
            .collect();
        let back = translate_ids_to_letters(&numeric, &id_to_letter).unwrap();
        assert_eq!(back, formula);
    }

    #[test]
    fn translation_rejects_unmapped_reference() {
        let letter_to_id: HashMap<String, u64> = [("A".to_owned(), 1)].into_iter().collect();
        let err = translate_letters_to_ids("A and B", &letter_to_id).unwrap_err();
        assert_eq!(err, FormulaError::MissingCondition("B".to_owned()));
    }

    #[test]
    fn resolve_letters_for_and_or() {
        let mut conditions = vec![
            condition(1, ConditionType::HostGroup, "5"),
            condition(2, ConditionType::HostGroup, "7"),
            condition(3, ConditionType::Severity, "3"),
        ];
        let formula = resolve_letters(&mut conditions, EvalType::AndOr, "").unwrap();
        assert_eq!(formula, "A and (B or C)");
        assert_eq!(conditions[2].formula_id.as_deref(), Some("A"));
        assert_eq!(conditions[1].formula_id.as_deref(), Some("B"));
        assert_eq!(conditions[0].formula_id.as_deref(), Some("C"));
    }

    #[test]
    fn resolve_letters_for_custom_expression() {
        let mut conditions = vec![
            condition(11, ConditionType::Host, "1"),
            condition(12, ConditionType::Severity, "4"),
        ];
        let formula =
            resolve_letters(&mut conditions, EvalType::CustomExpression, "{12} or {11}").unwrap();
        assert_eq!(formula, "A or B");
        assert_eq!(conditions[1].formula_id.as_deref(), Some("A"));
        assert_eq!(conditions[0].formula_id.as_deref(), Some("B"));
    }

    #[test]
    fn resolve_letters_flags_stale_condition() {
        let mut conditions = vec![
            condition(11, ConditionType::Host, "1"),
            condition(12, ConditionType::Severity, "4"),
        ];
        let err =
            resolve_letters(&mut conditions, EvalType::CustomExpression, "{12}").unwrap_err();
        assert_eq!(err, FormulaError::UnusedCondition("11".to_owned()));
    }
}
