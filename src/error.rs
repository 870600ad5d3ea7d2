//! Unified application error model and HTTP mapping helpers.
//!
//! Mirrors the taxonomy the query/command grammar and the storage/cache
//! layers need: parse and schema errors are caller-visible (400), backend
//! errors are logged and degrade gracefully, and cache errors never escape
//! to a caller — they are always retried or folded into a backend fallback
//! before a response is produced.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Malformed query or command string (grammar violations).
    Parse { code: String, message: String },
    /// Arity mismatch, unknown column, or unknown operator.
    Schema { code: String, message: String },
    /// I/O or relational failure.
    Backend { code: String, message: String },
    /// Internal-only: a distributed cache lock could not be acquired.
    /// Never returned to an HTTP caller; callers must retry or fall back.
    Cache { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Parse { code, .. }
            | AppError::Schema { code, .. }
            | AppError::Backend { code, .. }
            | AppError::Cache { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Parse { message, .. }
            | AppError::Schema { message, .. }
            | AppError::Backend { message, .. }
            | AppError::Cache { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn parse<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Parse { code: code.into(), message: msg.into() }
    }
    pub fn schema<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Schema { code: code.into(), message: msg.into() }
    }
    pub fn backend<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Backend { code: code.into(), message: msg.into() }
    }
    pub fn cache<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Cache { code: code.into(), message: msg.into() }
    }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Internal { code: code.into(), message: msg.into() }
    }

    /// Map to an HTTP status code. `Cache` has no sensible mapping since it
    /// must never reach this point; it maps to 500 as a defensive default.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Parse { .. } => 400,
            AppError::Schema { .. } => 400,
            AppError::Backend { .. } => 502,
            AppError::Cache { .. } => 500,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Backend { code: "io_error".into(), message: err.to_string() }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Backend { code: "csv_error".into(), message: err.to_string() }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Backend { code: "sql_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::parse("bad_query", "oops").http_status(), 400);
        assert_eq!(AppError::schema("arity_mismatch", "wrong count").http_status(), 400);
        assert_eq!(AppError::backend("io_error", "disk full").http_status(), 502);
        assert_eq!(AppError::internal("panic", "x").http_status(), 500);
    }

    #[test]
    fn display_includes_code_and_message() {
        let e = AppError::parse("bad_query", "unmatched quote");
        assert_eq!(e.to_string(), "bad_query: unmatched quote");
    }
}
