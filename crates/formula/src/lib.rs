//! Condition formula engine for Actum.
//!
//! Builds the boolean formula combining a filter's conditions, assigns and
//! translates letter ids, and validates caller-supplied custom
//! expressions.

pub mod engine;
pub mod error;
pub mod parser;
pub mod validate;

pub use engine::{
    assign_formula_ids, build_formula, canonical_cmp, canonical_sort, index_to_letter,
    letter_assignment, resolve_letters, translate_ids_to_letters, translate_letters_to_ids,
};
pub use error::FormulaError;
pub use parser::{parse_formula, FormulaExpr};
pub use validate::validate_filter;
