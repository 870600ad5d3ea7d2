//! Query language: condition tuples, the comparison operators, and the
//! canonical left-fold evaluator.
//!
//! Grounded in `examples/original_source/database/query_parser.py` and
//! `database/data_filter.py` for grammar and evaluation order, re-expressed
//! as a hand-written scanner in the style of `clarium`'s
//! `server::query::query_parse_where` tokenizer rather than a regex port.

mod parser;
mod sql;

pub use parser::parse_query;
pub use sql::conditions_to_sql;

use crate::error::AppError;

/// A condition's left-hand side: either a named column or the wildcard `*`,
/// which means "every cell of the row must satisfy this
/// condition", not "any cell".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Wildcard,
    Named(String),
}

impl Column {
    pub fn as_str(&self) -> &str {
        match self {
            Column::Wildcard => "*",
            Column::Named(s) => s.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `==` exact equality.
    Eq,
    /// `!=` exact inequality.
    Ne,
    /// `$=` ASCII case-insensitive equality.
    CiEq,
    /// `&=` substring containment (value is contained in the cell).
    Contains,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::CiEq => "$=",
            Operator::Contains => "&=",
        }
    }

    fn from_token(tok: &str) -> Option<Self> {
        match tok {
            "==" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            "$=" => Some(Operator::CiEq),
            "&=" => Some(Operator::Contains),
            _ => None,
        }
    }

    /// Evaluate this operator against a single cell value.
    pub fn matches(self, cell: &str, value: &str) -> bool {
        match self {
            Operator::Eq => cell == value,
            Operator::Ne => cell != value,
            Operator::CiEq => cell.eq_ignore_ascii_case(value),
            Operator::Contains => cell.contains(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
    /// The empty connective: ends evaluation at this condition.
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: Column,
    pub operator: Operator,
    pub value: String,
    pub connective: Connective,
}

/// Evaluate a parsed condition against a row using the wildcard/cell
/// semantics of: a named column condition looks up that one
/// cell (missing columns read as `""`); a wildcard condition requires the
/// operator to hold for *every* cell in the row.
pub fn condition_matches(row: &crate::storage::Row, condition: &Condition) -> bool {
    match &condition.column {
        Column::Wildcard => row
            .values()
            .all(|cell| condition.operator.matches(cell, &condition.value)),
        Column::Named(name) => {
            let cell = row.get(name).map(|s| s.as_str()).unwrap_or("");
            condition.operator.matches(cell, &condition.value)
        }
    }
}

/// The canonical left-fold evaluator:
/// conditions are folded left-to-right using the *previous* condition's
/// connective; the first condition seeds the accumulator; an `End`
/// connective stops evaluation early and the running accumulator is the
/// row's match decision. This is deliberately not associative-safe — it
/// reproduces `A or B and C == (A or B) and C`.
pub fn row_matches(row: &crate::storage::Row, conditions: &[Condition]) -> bool {
    let mut iter = conditions.iter();
    let Some(first) = iter.next() else { return true };
    let mut acc = condition_matches(row, first);
    let mut prev_connective = first.connective;
    for cond in iter {
        if prev_connective == Connective::End {
            break;
        }
        let this_match = condition_matches(row, cond);
        acc = match prev_connective {
            Connective::And => acc && this_match,
            Connective::Or => acc || this_match,
            Connective::End => unreachable!("checked above"),
        };
        prev_connective = cond.connective;
    }
    acc
}

pub fn parse_error(msg: impl Into<String>) -> AppError {
    AppError::Parse { code: "bad_query".to_string(), message: msg.into() }
}
