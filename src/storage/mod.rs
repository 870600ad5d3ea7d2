//! Storage backends: the polymorphic `{read, write, add, delete, update,
//! query, get_columns}` capability set, with two interchangeable
//! implementations (`file`, `relational`).
//!
//! `Row`/`Table` model an ordered mapping from column name to cell value,
//! with column order fixed at backend initialization — a row never
//! re-derives column order from a `HashMap`; it shares the canonical
//! column list via `Arc`.

pub mod file;
pub mod relational;

use crate::error::AppResult;
use crate::query::Condition;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// One row: an ordered mapping from column name to cell value, sharing the
/// table's canonical column list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<String>,
}

impl Row {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<String>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&String> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    /// Set a cell by column name. Returns `false` if the column does not
    /// exist (callers should have already validated this via `get_columns`).
    pub fn set(&mut self, column: &str, value: String) -> bool {
        match self.columns.iter().position(|c| c == column) {
            Some(idx) => {
                self.values[idx] = value;
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &String> {
        self.values.iter()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The row as an ordered list of `(column, value)` pairs, used for CSV
    /// serialization and JSON responses.
    pub fn as_pairs(&self) -> Vec<(&str, &str)> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(c, v)| (c.as_str(), v.as_str()))
            .collect()
    }
}

impl serde::Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (c, v) in self.columns.iter().zip(self.values.iter()) {
            map.serialize_entry(c, v)?;
        }
        map.end()
    }
}

/// An in-memory table: the canonical column list, the row sequence, and the
/// dirty flag. Every row's key set equals the
/// canonical column set by construction — `Row` cannot hold a different
/// column list than the `Table` it came from.
#[derive(Clone, Debug, Default)]
pub struct Table {
    pub columns: Arc<Vec<String>>,
    pub rows: Vec<Row>,
    pub dirty: bool,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns: Arc::new(columns), rows: Vec::new(), dirty: false }
    }

    pub fn add_row(&mut self, values: Vec<String>) -> AppResult<()> {
        if values.len() != self.columns.len() {
            return Err(crate::error::AppError::schema(
                "arity_mismatch",
                format!(
                    "INSERT expects {} values, got {}",
                    self.columns.len(),
                    values.len()
                ),
            ));
        }
        self.rows.push(Row::new(self.columns.clone(), values));
        self.dirty = true;
        Ok(())
    }

    pub fn delete_where(&mut self, cond_map: &HashMap<String, String>) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !row_matches_equality(row, cond_map));
        let removed = before - self.rows.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn update_where(
        &mut self,
        cond_map: &HashMap<String, String>,
        target: &str,
        new_value: &str,
    ) -> AppResult<usize> {
        if !self.columns.iter().any(|c| c == target) {
            return Err(crate::error::AppError::schema(
                "unknown_column",
                format!("target column '{target}' does not exist"),
            ));
        }
        let mut updated = 0usize;
        for row in self.rows.iter_mut() {
            if row_matches_equality(row, cond_map) {
                row.set(target, new_value.to_string());
                updated += 1;
            }
        }
        if updated > 0 {
            self.dirty = true;
        }
        Ok(updated)
    }

    pub fn query(&self, conditions: &[Condition]) -> Vec<Row> {
        self.rows
            .iter()
            .filter(|row| crate::query::row_matches(row, conditions))
            .cloned()
            .collect()
    }
}

fn row_matches_equality(row: &Row, cond_map: &HashMap<String, String>) -> bool {
    cond_map.iter().all(|(col, val)| row.get(col).map(|v| v == val).unwrap_or(false))
}

/// Build the equality condition map for DELETE/UPDATE: the first `k` values
/// map positionally to the first `k` canonical columns.
pub fn positional_condition_map(columns: &[String], values: &[String]) -> HashMap<String, String> {
    columns
        .iter()
        .zip(values.iter())
        .map(|(c, v)| (c.clone(), v.clone()))
        .collect()
}

/// The capability set every storage backend exposes. The service depends
/// only on this trait, never on a concrete backend type.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Load persistent state into memory. No-op for backends that are
    /// always backed live (the relational backend).
    async fn read(&self) -> AppResult<()>;

    /// Flush dirty state to persistence and clear the dirty flag.
    async fn write(&self) -> AppResult<()>;

    /// Append a row. `values` must have exactly `get_columns().len()` items.
    async fn add(&self, values: Vec<String>) -> AppResult<()>;

    /// Remove all rows whose cells equal every `(column, value)` pair.
    /// Returns the number of rows removed.
    async fn delete(&self, cond_map: &HashMap<String, String>) -> AppResult<usize>;

    /// Set `target` to `new_value` on every row matching `cond_map`.
    /// Returns the number of rows updated.
    async fn update(
        &self,
        cond_map: &HashMap<String, String>,
        target: &str,
        new_value: &str,
    ) -> AppResult<usize>;

    /// Return every row matching the parsed conditions.
    async fn query(&self, conditions: &[Condition]) -> AppResult<Vec<Row>>;

    /// The canonical, backend-initialization-fixed column list.
    fn get_columns(&self) -> Vec<String>;

    fn is_dirty(&self) -> bool;
}
