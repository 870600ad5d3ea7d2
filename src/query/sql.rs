//! Translate parsed conditions into a parameterized, left-associated SQL
//! boolean expression that is provably equivalent to the canonical
//! left-fold evaluator in `super::row_matches`.
//!
//! The Python source this crate's query semantics were ported from
//! translates mixed `and`/`or` chains by grouping runs of `and`-connected
//! conditions into conjunctions and OR-combining the runs — not equivalent
//! to the left-fold evaluator for mixed `and`/`or` expressions, and a
//! latent bug rather than an intentional grouping rule. DESIGN.md records
//! the decision to not preserve that bug here: this module instead builds
//! the left fold directly as nested, explicitly parenthesized SQL:
//! `((c1 <op2> c2) <op3> c3) ...`, which matches `row_matches` exactly for
//! every input, not just conjunctions of equalities.
//!
//! Wildcard (`*`) conditions expand to a conjunction across every column,
//! matching the wildcard's own "every cell must match" semantics.

use super::{Column, Condition, Connective, Operator};

/// One bound parameter plus its SQL fragment. `?` placeholders are used
/// (MySQL positional bind style, matching `sqlx`'s `mysql` driver).
pub struct SqlWhere {
    pub clause: String,
    pub params: Vec<String>,
}

/// Build a `WHERE`-clause body (no leading `WHERE`) for the given
/// conditions and column list. Returns `None` for an empty condition list
/// (the caller should omit the `WHERE` clause entirely in that case).
pub fn conditions_to_sql(conditions: &[Condition], columns: &[String]) -> Option<SqlWhere> {
    let mut iter = conditions.iter();
    let first = iter.next()?;
    let mut params = Vec::new();
    let mut clause = condition_sql(first, columns, &mut params);
    let mut prev_connective = first.connective;

    for cond in iter {
        if prev_connective == Connective::End {
            break;
        }
        let this_sql = condition_sql(cond, columns, &mut params);
        let op = match prev_connective {
            Connective::And => "AND",
            Connective::Or => "OR",
            Connective::End => unreachable!("checked above"),
        };
        clause = format!("({clause} {op} {this_sql})");
        prev_connective = cond.connective;
    }

    Some(SqlWhere { clause, params })
}

fn condition_sql(condition: &Condition, columns: &[String], params: &mut Vec<String>) -> String {
    match &condition.column {
        Column::Named(name) => {
            params.push(condition.value.clone());
            single_column_sql(name, condition.operator)
        }
        Column::Wildcard => {
            let mut parts = Vec::with_capacity(columns.len());
            for col in columns {
                params.push(condition.value.clone());
                parts.push(single_column_sql(col, condition.operator));
            }
            if parts.is_empty() {
                "1=1".to_string()
            } else {
                format!("({})", parts.join(" AND "))
            }
        }
    }
}

fn single_column_sql(column: &str, operator: Operator) -> String {
    let quoted = quote_ident(column);
    match operator {
        Operator::Eq => format!("{quoted} = ?"),
        Operator::Ne => format!("{quoted} <> ?"),
        Operator::CiEq => format!("LOWER({quoted}) = LOWER(?)"),
        Operator::Contains => format!("{quoted} LIKE CONCAT('%', ?, '%')"),
    }
}

fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;

    #[test]
    fn single_equality() {
        let conds = parse_query(r#"C1 == "x""#).unwrap();
        let sql = conditions_to_sql(&conds, &["C1".into(), "C2".into()]).unwrap();
        assert_eq!(sql.clause, "`C1` = ?");
        assert_eq!(sql.params, vec!["x"]);
    }

    #[test]
    fn left_associated_mixed() {
        let conds =
            parse_query(r#"A == "1" or B == "2" and C == "3""#).unwrap();
        let sql = conditions_to_sql(&conds, &["A".into(), "B".into(), "C".into()]).unwrap();
        assert_eq!(sql.clause, "((`A` = ? OR `B` = ?) AND `C` = ?)");
        assert_eq!(sql.params, vec!["1", "2", "3"]);
    }

    #[test]
    fn wildcard_expands_to_all_columns() {
        let conds = parse_query(r#"* &= "A""#).unwrap();
        let sql = conditions_to_sql(&conds, &["C1".into(), "C2".into()]).unwrap();
        assert_eq!(
            sql.clause,
            "(`C1` LIKE CONCAT('%', ?, '%') AND `C2` LIKE CONCAT('%', ?, '%'))"
        );
        assert_eq!(sql.params, vec!["A", "A"]);
    }
}
