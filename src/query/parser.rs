//! Hand-written scanner for the query grammar:
//!
//! ```text
//! query      := clause (conn clause)*
//! clause     := column op '"' value '"'
//! column     := '*' | identifier            ; identifier = [A-Za-z0-9_]+
//! op         := '==' | '!=' | '$=' | '&='
//! value      := any character sequence; \" is unescaped to "
//! conn       := whitespace 'and' whitespace | whitespace 'or' whitespace
//! ```
//!
//! Ported from the semantics of `database/query_parser.py`'s regex
//! (`(\*|[A-Za-z0-9_]+)\s*(==|!=|\$=|&=)\s*"(.*?)(?<!\\)"(\s+and\s+|\s+or\s+|$)`)
//! without reusing regex — a plain-character scan in the `Tok { kind, pos }`,
//! position-tracked-errors style used elsewhere in this crate's parsers, but
//! scoped to this much smaller four-operator grammar.

use super::{parse_error, Column, Condition, Connective, Operator};
use crate::error::AppResult;

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src: src.as_bytes(), pos: 0 }
    }

    fn eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if pred(b)) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("")
    }

    fn starts_with(&self, lit: &str) -> bool {
        self.src[self.pos..].starts_with(lit.as_bytes())
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Parse a query string into an ordered list of conditions.
pub fn parse_query(query: &str) -> AppResult<Vec<Condition>> {
    if query.trim().is_empty() {
        return Err(parse_error("empty query"));
    }
    let mut sc = Scanner::new(query);
    let mut conditions = Vec::new();

    loop {
        sc.skip_ws();
        let column = parse_column(&mut sc)?;
        sc.skip_ws();
        let operator = parse_operator(&mut sc)?;
        sc.skip_ws();
        let value = parse_quoted_value(&mut sc)?;
        let connective = parse_connective(&mut sc)?;
        conditions.push(Condition { column, operator, value, connective });
        if connective == Connective::End {
            break;
        }
    }

    if !sc.eof() {
        return Err(parse_error(format!(
            "unexpected trailing input in query at byte {}",
            sc.pos
        )));
    }

    Ok(conditions)
}

fn parse_column(sc: &mut Scanner) -> AppResult<Column> {
    if sc.peek() == Some(b'*') {
        sc.pos += 1;
        return Ok(Column::Wildcard);
    }
    let ident = sc.take_while(is_ident_byte);
    if ident.is_empty() {
        return Err(parse_error(format!(
            "expected column name or '*' at byte {}",
            sc.pos
        )));
    }
    Ok(Column::Named(ident.to_string()))
}

fn parse_operator(sc: &mut Scanner) -> AppResult<Operator> {
    for tok in ["==", "!=", "$=", "&="] {
        if sc.starts_with(tok) {
            sc.pos += 2;
            return Ok(Operator::from_token(tok).unwrap());
        }
    }
    Err(parse_error(format!(
        "expected one of ==, !=, $=, &= at byte {}",
        sc.pos
    )))
}

fn parse_quoted_value(sc: &mut Scanner) -> AppResult<String> {
    if sc.peek() != Some(b'"') {
        return Err(parse_error(format!("expected '\"' at byte {}", sc.pos)));
    }
    sc.pos += 1;
    let mut value = String::new();
    loop {
        match sc.peek() {
            None => return Err(parse_error("unterminated string literal")),
            Some(b'\\') if sc.src.get(sc.pos + 1) == Some(&b'"') => {
                value.push('"');
                sc.pos += 2;
            }
            Some(b'"') => {
                sc.pos += 1;
                break;
            }
            Some(_) => {
                // Advance by one UTF-8 scalar, not one byte, to preserve
                // multi-byte characters in the value.
                let rest = std::str::from_utf8(&sc.src[sc.pos..]).unwrap_or("");
                let ch = rest.chars().next().unwrap();
                value.push(ch);
                sc.pos += ch.len_utf8();
            }
        }
    }
    Ok(value)
}

fn parse_connective(sc: &mut Scanner) -> AppResult<Connective> {
    let save = sc.pos;
    sc.skip_ws();
    if sc.starts_with("and") && is_boundary(sc, 3) {
        sc.pos += 3;
        return Ok(Connective::And);
    }
    if sc.starts_with("or") && is_boundary(sc, 2) {
        sc.pos += 2;
        return Ok(Connective::Or);
    }
    sc.pos = save;
    sc.skip_ws();
    if sc.eof() {
        return Ok(Connective::End);
    }
    Err(parse_error(format!(
        "expected 'and', 'or', or end of query at byte {}",
        sc.pos
    )))
}

/// True if the keyword at the current position is followed by whitespace
/// (required by the grammar) so `android` is never mistaken for `and`.
fn is_boundary(sc: &Scanner, keyword_len: usize) -> bool {
    match sc.src.get(sc.pos + keyword_len) {
        Some(b) => b.is_ascii_whitespace(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_condition() {
        let conds = parse_query(r#"C1 == "Sample Text 1""#).unwrap();
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].column, Column::Named("C1".into()));
        assert_eq!(conds[0].operator, Operator::Eq);
        assert_eq!(conds[0].value, "Sample Text 1");
        assert_eq!(conds[0].connective, Connective::End);
    }

    #[test]
    fn escaped_quote_in_value() {
        let conds =
            parse_query(r#"C2 == "Another \"Sample\"""#).unwrap();
        assert_eq!(conds[0].value, "Another \"Sample\"");
    }

    #[test]
    fn and_chain() {
        let conds =
            parse_query(r#"C1 == "Sample Text 1" and C2 == "Another \"Sample\"""#).unwrap();
        assert_eq!(conds.len(), 2);
        assert_eq!(conds[0].connective, Connective::And);
        assert_eq!(conds[1].connective, Connective::End);
    }

    #[test]
    fn wildcard_column() {
        let conds = parse_query(r#"* &= "A""#).unwrap();
        assert_eq!(conds[0].column, Column::Wildcard);
    }

    #[test]
    fn mixed_or_and() {
        let conds = parse_query(
            r#"Nation == "A" or Nation == "B" and Category == "C""#,
        )
        .unwrap();
        assert_eq!(conds.len(), 3);
        assert_eq!(conds[0].connective, Connective::Or);
        assert_eq!(conds[1].connective, Connective::And);
        assert_eq!(conds[2].connective, Connective::End);
    }

    #[test]
    fn empty_query_is_error() {
        assert!(parse_query("").is_err());
        assert!(parse_query("   ").is_err());
    }

    #[test]
    fn unknown_operator_is_error() {
        assert!(parse_query(r#"C1 ~= "x""#).is_err());
    }

    #[test]
    fn unterminated_quote_is_error() {
        assert!(parse_query(r#"C1 == "unterminated"#).is_err());
    }

    #[test]
    fn trailing_garbage_is_error() {
        assert!(parse_query(r#"C1 == "x" garbage"#).is_err());
    }
}
