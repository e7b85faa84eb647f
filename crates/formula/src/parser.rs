//! Recursive descent parser for condition formulas.
//!
//! The parser uses `nom` for low-level token recognition. The grammar is
//! deliberately small: references combined with `and` / `or` keywords and
//! parentheses, keywords separated from their operands by whitespace.
//!
//! ```text
//! expr   := or
//! or     := and ( "or" and )*
//! and    := atom ( "and" atom )*
//! atom   := ref | "(" expr ")"
//! ref    := [A-Z]+ | "{" [0-9]+ "}"
//! ```
//!
//! `and` binds tighter than `or`. References are either letter ids as
//! presented to callers (`A`, `B`, ... `AA`, ...) or numeric condition ids
//! in braces as persisted (`{17}`).

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::map,
    sequence::{delimited, preceded},
    IResult,
};

use crate::error::FormulaError;

/// Parsed formula expression. Connectives with more than two operands are
/// kept flat, so `A and B and C` parses to one `And` of three refs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaExpr {
    /// A condition reference token: a letter id or `{<numeric id>}`.
    Ref(String),
    And(Vec<FormulaExpr>),
    Or(Vec<FormulaExpr>),
}

impl FormulaExpr {
    /// All reference tokens in left-to-right appearance order, duplicates
    /// included.
    #[must_use]
    pub fn refs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Ref(token) => out.push(token),
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.collect_refs(out);
                }
            }
        }
    }

    /// Reference groups that are conjoined: for every `And` node, the
    /// references reachable without crossing an `Or` boundary. Used for
    /// semantic checks on mutually exclusive conditions.
    #[must_use]
    pub fn conjunct_groups(&self) -> Vec<Vec<&str>> {
        let mut groups = Vec::new();
        self.collect_conjuncts(&mut groups);
        groups
    }

    fn collect_conjuncts<'a>(&'a self, groups: &mut Vec<Vec<&'a str>>) {
        match self {
            Self::Ref(_) => {}
            Self::And(items) => {
                let mut group = Vec::new();
                for item in items {
                    item.flatten_and(&mut group);
                }
                groups.push(group);
                // Nested Or operands may hold further And nodes.
                for item in items {
                    item.collect_conjuncts(groups);
                }
            }
            Self::Or(items) => {
                for item in items {
                    item.collect_conjuncts(groups);
                }
            }
        }
    }

    /// Collect refs conjoined with this node, flattening nested `And`s and
    /// stopping at `Or` boundaries.
    fn flatten_and<'a>(&'a self, group: &mut Vec<&'a str>) {
        match self {
            Self::Ref(token) => group.push(token),
            Self::And(items) => {
                for item in items {
                    item.flatten_and(group);
                }
            }
            Self::Or(_) => {}
        }
    }
}

/// Parse a complete formula string.
///
/// Returns [`FormulaError::Parse`] on malformed input or trailing tokens.
pub fn parse_formula(input: &str) -> Result<FormulaExpr, FormulaError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(FormulaError::Parse("empty formula".to_owned()));
    }
    let (rest, expr) = parse_or(trimmed)
        .map_err(|e| FormulaError::Parse(format!("invalid formula {input:?}: {e}")))?;
    if !rest.trim().is_empty() {
        return Err(FormulaError::Parse(format!(
            "unexpected trailing input: {rest:?}"
        )));
    }
    Ok(expr)
}

fn parse_or(input: &str) -> IResult<&str, FormulaExpr> {
    let (mut input, first) = parse_and(input)?;
    let mut operands = vec![first];
    while let Ok((rest, operand)) = preceded(keyword_or, parse_and)(input) {
        operands.push(operand);
        input = rest;
    }
    Ok((input, fold_operands(operands, FormulaExpr::Or)))
}

fn parse_and(input: &str) -> IResult<&str, FormulaExpr> {
    let (mut input, first) = parse_atom(input)?;
    let mut operands = vec![first];
    while let Ok((rest, operand)) = preceded(keyword_and, parse_atom)(input) {
        operands.push(operand);
        input = rest;
    }
    Ok((input, fold_operands(operands, FormulaExpr::And)))
}

fn fold_operands(
    mut operands: Vec<FormulaExpr>,
    make: impl FnOnce(Vec<FormulaExpr>) -> FormulaExpr,
) -> FormulaExpr {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        make(operands)
    }
}

fn keyword_and(input: &str) -> IResult<&str, &str> {
    delimited(multispace1, tag("and"), multispace1)(input)
}

fn keyword_or(input: &str) -> IResult<&str, &str> {
    delimited(multispace1, tag("or"), multispace1)(input)
}

fn parse_atom(input: &str) -> IResult<&str, FormulaExpr> {
    let (input, _) = multispace0(input)?;
    alt((parse_ref, parse_paren))(input)
}

fn parse_paren(input: &str) -> IResult<&str, FormulaExpr> {
    delimited(
        char('('),
        delimited(multispace0, parse_or, multispace0),
        char(')'),
    )(input)
}

fn parse_ref(input: &str) -> IResult<&str, FormulaExpr> {
    alt((
        map(take_while1(|c: char| c.is_ascii_uppercase()), |s: &str| {
            FormulaExpr::Ref(s.to_owned())
        }),
        map(
            delimited(
                char('{'),
                take_while1(|c: char| c.is_ascii_digit()),
                char('}'),
            ),
            |digits: &str| FormulaExpr::Ref(format!("{{{digits}}}")),
        ),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(token: &str) -> FormulaExpr {
        FormulaExpr::Ref(token.to_owned())
    }

    #[test]
    fn parses_single_ref() {
        assert_eq!(parse_formula("A").unwrap(), r("A"));
        assert_eq!(parse_formula("  {42} ").unwrap(), r("{42}"));
        assert_eq!(parse_formula("AB").unwrap(), r("AB"));
    }

    #[test]
    fn parses_flat_connectives() {
        assert_eq!(
            parse_formula("A and B and C").unwrap(),
            FormulaExpr::And(vec![r("A"), r("B"), r("C")])
        );
        assert_eq!(
            parse_formula("{1} or {2}").unwrap(),
            FormulaExpr::Or(vec![r("{1}"), r("{2}")])
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert_eq!(
            parse_formula("A or B and C").unwrap(),
            FormulaExpr::Or(vec![r("A"), FormulaExpr::And(vec![r("B"), r("C")])])
        );
    }

    #[test]
    fn parses_grouped_expression() {
        assert_eq!(
            parse_formula("(A or B) and C").unwrap(),
            FormulaExpr::And(vec![FormulaExpr::Or(vec![r("A"), r("B")]), r("C")])
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse_formula(""), Err(FormulaError::Parse(_))));
        assert!(matches!(parse_formula("A and"), Err(FormulaError::Parse(_))));
        assert!(matches!(
            parse_formula("(A or B"),
            Err(FormulaError::Parse(_))
        ));
        assert!(matches!(
            parse_formula("A B"),
            Err(FormulaError::Parse(_))
        ));
        assert!(matches!(
            parse_formula("a and b"),
            Err(FormulaError::Parse(_))
        ));
    }

    #[test]
    fn refs_in_appearance_order() {
        let expr = parse_formula("(B or A) and C and B").unwrap();
        assert_eq!(expr.refs(), vec!["B", "A", "C", "B"]);
    }

    #[test]
    fn conjunct_groups_stop_at_or() {
        let expr = parse_formula("A and (B or C and D)").unwrap();
        let groups = expr.conjunct_groups();
        // Outer: A conjoined with the parenthesised Or (boundary).
        // Inner: C and D.
        assert!(groups.contains(&vec!["A"]));
        assert!(groups.contains(&vec!["C", "D"]));
    }

    #[test]
    fn conjunct_groups_flatten_nested_and() {
        let expr = parse_formula("A and (B and C)").unwrap();
        let groups = expr.conjunct_groups();
        assert!(groups.iter().any(|g| *g == vec!["A", "B", "C"]));
    }
}
