//! Mutation command language: `INSERT`, `DELETE`, `UPDATE`.
//!
//! Grounded in `examples/original_source/database/data_modifier.py`'s three
//! regexes, re-expressed as hand-written scanners in the style of
//! `query::parser`. The whole command is percent-decoded first (the Python
//! source's `urllib.parse.unquote`), then dispatched on its leading keyword.
//!
//! Escape processing differs from the query grammar: here both `\"` and
//! `\\` are unescaped (`data_modifier.py`'s
//! `value.replace('\\"', '"').replace('\\\\', '\\')`), not just `\"`.

use crate::error::{AppError, AppResult};

/// A parsed mutation, still in positional form — the caller maps
/// `condition_values`/`values` onto column names using the backend's
/// canonical column list (`storage::positional_condition_map`), exactly as
/// `data_modifier.py` zips `self.columns[i]` with parsed value `i`.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationCommand {
    Insert(Vec<String>),
    Delete(Vec<String>),
    Update { condition_values: Vec<String>, target_column: String, new_value: String },
}

/// Parse a raw, percent-encoded command body and validate it against
/// `columns` (arity for INSERT/DELETE, target-column existence for UPDATE).
pub fn parse_command(raw: &str, columns: &[String]) -> AppResult<MutationCommand> {
    let decoded = urlencoding::decode(raw)
        .map_err(|e| AppError::parse("bad_encoding", format!("invalid percent-encoding: {e}")))?
        .into_owned();

    if let Some(rest) = decoded.strip_prefix("INSERT") {
        parse_insert(rest.trim(), columns)
    } else if let Some(rest) = decoded.strip_prefix("DELETE") {
        parse_delete(rest.trim(), columns)
    } else if let Some(rest) = decoded.strip_prefix("UPDATE") {
        parse_update(rest.trim(), columns)
    } else {
        Err(AppError::parse("unknown_command", "command must start with INSERT, DELETE, or UPDATE"))
    }
}

fn unescape(value: &str) -> String {
    value.replace("\\\"", "\"").replace("\\\\", "\\")
}

/// Scan a run of `"..."` values separated by commas, starting at the
/// current position. Stops at the first token that isn't a quoted string.
/// Mirrors `data_modifier.py`'s `"((?:[^"\\]|\\.)*)"` repeated-match regex.
fn scan_quoted_values(src: &str) -> Vec<String> {
    let bytes = src.as_bytes();
    let mut pos = 0usize;
    let mut values = Vec::new();
    loop {
        while matches!(bytes.get(pos), Some(b) if b.is_ascii_whitespace()) {
            pos += 1;
        }
        if !values.is_empty() {
            if bytes.get(pos) == Some(&b',') {
                pos += 1;
                while matches!(bytes.get(pos), Some(b) if b.is_ascii_whitespace()) {
                    pos += 1;
                }
            } else {
                break;
            }
        }
        if bytes.get(pos) != Some(&b'"') {
            break;
        }
        pos += 1;
        let mut raw = String::new();
        let mut closed = false;
        while pos < bytes.len() {
            match bytes[pos] {
                b'\\' if pos + 1 < bytes.len() => {
                    raw.push(bytes[pos] as char);
                    raw.push(bytes[pos + 1] as char);
                    pos += 2;
                }
                b'"' => {
                    pos += 1;
                    closed = true;
                    break;
                }
                _ => {
                    let rest = std::str::from_utf8(&bytes[pos..]).unwrap_or("");
                    let ch = rest.chars().next().unwrap_or('\u{fffd}');
                    raw.push(ch);
                    pos += ch.len_utf8();
                }
            }
        }
        if !closed {
            break;
        }
        values.push(unescape(&raw));
    }
    values
}

fn parse_insert(command: &str, columns: &[String]) -> AppResult<MutationCommand> {
    let values = scan_quoted_values(command);
    if values.is_empty() {
        return Err(AppError::parse("bad_insert", "INSERT requires at least one quoted value"));
    }
    if values.len() != columns.len() {
        return Err(AppError::schema(
            "arity_mismatch",
            format!("Column count mismatch. Expected {}, got {}.", columns.len(), values.len()),
        ));
    }
    Ok(MutationCommand::Insert(values))
}

fn parse_delete(command: &str, columns: &[String]) -> AppResult<MutationCommand> {
    let values = scan_all_quoted(command);
    if values.is_empty() {
        return Err(AppError::parse(
            "bad_delete",
            "Too few conditions for DELETE command. Check conditions are surrounded by \"\".",
        ));
    }
    if values.len() > columns.len() {
        return Err(AppError::schema(
            "too_many_conditions",
            format!("Too many conditions for DELETE command. Table has {} columns.", columns.len()),
        ));
    }
    Ok(MutationCommand::Delete(values))
}

/// Unlike `scan_quoted_values` (INSERT), DELETE's quoted values don't need
/// to be comma-separated in the source grammar — the Python regex just
/// `findall`s every `"..."` span in the command, so any quoted token
/// anywhere counts.
fn scan_all_quoted(command: &str) -> Vec<String> {
    let bytes = command.as_bytes();
    let mut pos = 0usize;
    let mut values = Vec::new();
    while pos < bytes.len() {
        if bytes[pos] != b'"' {
            pos += 1;
            continue;
        }
        pos += 1;
        let mut raw = String::new();
        let mut closed = false;
        while pos < bytes.len() {
            match bytes[pos] {
                b'\\' if pos + 1 < bytes.len() => {
                    raw.push(bytes[pos] as char);
                    raw.push(bytes[pos + 1] as char);
                    pos += 2;
                }
                b'"' => {
                    pos += 1;
                    closed = true;
                    break;
                }
                _ => {
                    let rest = std::str::from_utf8(&bytes[pos..]).unwrap_or("");
                    let ch = rest.chars().next().unwrap_or('\u{fffd}');
                    raw.push(ch);
                    pos += ch.len_utf8();
                }
            }
        }
        if closed {
            values.push(unescape(&raw));
        }
    }
    values
}

/// UPDATE's grammar mixes quoted condition/value tokens with one bare
/// identifier (the target column): `data_modifier.py`'s
/// `(?:"((?:[^"\\]|\\.)*)"|\b([A-Za-z0-9_]+)\b)` alternation, matched in
/// source order. The last two tokens are always target column and new
/// value, regardless of which alternative matched them.
fn parse_update(command: &str, columns: &[String]) -> AppResult<MutationCommand> {
    let tokens = scan_update_tokens(command);
    if tokens.len() < 3 {
        return Err(AppError::parse(
            "bad_update",
            "UPDATE command must include at least one condition, target column, and a new value.",
        ));
    }
    let new_value = unescape(&tokens[tokens.len() - 1]);
    // The target column token is never unescaped upstream either — it's
    // always a bare identifier in practice, so this only matters if a
    // quoted string is used as the target, which `get_columns` would then
    // reject anyway.
    let target_column = tokens[tokens.len() - 2].clone();
    let condition_values: Vec<String> =
        tokens[..tokens.len() - 2].iter().map(|t| unescape(t)).collect();

    if !columns.iter().any(|c| c == &target_column) {
        return Err(AppError::schema(
            "unknown_column",
            format!("Target column '{target_column}' does not exist in the table."),
        ));
    }

    let condition_values = condition_values.into_iter().take(columns.len()).collect();
    Ok(MutationCommand::Update { condition_values, target_column, new_value })
}

/// Each token is either a quoted string body (raw, not yet unescaped) or a
/// bare `[A-Za-z0-9_]+` identifier run.
fn scan_update_tokens(command: &str) -> Vec<String> {
    let bytes = command.as_bytes();
    let mut pos = 0usize;
    let mut tokens = Vec::new();
    while pos < bytes.len() {
        match bytes[pos] {
            b'"' => {
                pos += 1;
                let mut raw = String::new();
                let mut closed = false;
                while pos < bytes.len() {
                    match bytes[pos] {
                        b'\\' if pos + 1 < bytes.len() => {
                            raw.push(bytes[pos] as char);
                            raw.push(bytes[pos + 1] as char);
                            pos += 2;
                        }
                        b'"' => {
                            pos += 1;
                            closed = true;
                            break;
                        }
                        _ => {
                            let rest = std::str::from_utf8(&bytes[pos..]).unwrap_or("");
                            let ch = rest.chars().next().unwrap_or('\u{fffd}');
                            raw.push(ch);
                            pos += ch.len_utf8();
                        }
                    }
                }
                if closed {
                    tokens.push(raw);
                }
            }
            b if b.is_ascii_alphanumeric() || b == b'_' => {
                let start = pos;
                while matches!(bytes.get(pos), Some(b) if b.is_ascii_alphanumeric() || *b == b'_') {
                    pos += 1;
                }
                tokens.push(command[start..pos].to_string());
            }
            _ => pos += 1,
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<String> {
        vec!["C1".into(), "C2".into(), "C3".into()]
    }

    #[test]
    fn insert_valid() {
        let cmd = parse_command(r#"INSERT "1","a","x""#, &cols()).unwrap();
        assert_eq!(cmd, MutationCommand::Insert(vec!["1".into(), "a".into(), "x".into()]));
    }

    #[test]
    fn insert_arity_mismatch_is_schema_error() {
        let err = parse_command(r#"INSERT "1","a""#, &cols()).unwrap_err();
        assert_eq!(err.code_str(), "arity_mismatch");
    }

    #[test]
    fn delete_partial_conditions() {
        let cmd = parse_command(r#"DELETE "1""#, &cols()).unwrap();
        assert_eq!(cmd, MutationCommand::Delete(vec!["1".into()]));
    }

    #[test]
    fn delete_too_many_conditions_is_schema_error() {
        let err = parse_command(r#"DELETE "1","a","x","extra""#, &cols()).unwrap_err();
        assert_eq!(err.code_str(), "too_many_conditions");
    }

    #[test]
    fn update_valid() {
        let cmd = parse_command(r#"UPDATE "1" C2 "changed""#, &cols()).unwrap();
        assert_eq!(
            cmd,
            MutationCommand::Update {
                condition_values: vec!["1".into()],
                target_column: "C2".into(),
                new_value: "changed".into(),
            }
        );
    }

    #[test]
    fn update_unknown_target_column_is_schema_error() {
        let err = parse_command(r#"UPDATE "1" C9 "changed""#, &cols()).unwrap_err();
        assert_eq!(err.code_str(), "unknown_column");
    }

    #[test]
    fn update_unescapes_backslash_and_quote() {
        let cmd = parse_command(r#"UPDATE "1" C2 "a\\b\"c""#, &cols()).unwrap();
        match cmd {
            MutationCommand::Update { new_value, .. } => assert_eq!(new_value, "a\\b\"c"),
            _ => panic!("expected Update"),
        }
    }

    #[test]
    fn unknown_command_is_parse_error() {
        let err = parse_command(r#"SELECT "1""#, &cols()).unwrap_err();
        assert_eq!(err.code_str(), "unknown_command");
    }

    #[test]
    fn percent_encoded_command_is_decoded_first() {
        let cmd = parse_command("INSERT%20%221%22%2C%22a%22%2C%22x%22", &cols()).unwrap();
        assert_eq!(cmd, MutationCommand::Insert(vec!["1".into(), "a".into(), "x".into()]));
    }
}
