//! Relational (MySQL) backend, grounded in
//! `examples/original_source/database/mysql_manager.py`'s schema and query
//! shape and in `LeakIX-oxide-sql`'s `sqlx::Pool`/`query` idiom.
//!
//! The default schema is a three-column table:
//! `C1` (primary key), `C2`, `C3`, all `VARCHAR`. `read`/`write` are no-ops
//! here — the pool is always live, so there is nothing to load into memory
//! or flush; `is_dirty` always reports `false` for the same reason.

use super::{Backend, Row};
use crate::error::{AppError, AppResult};
use crate::query::{conditions_to_sql, Condition};
use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySqlPool, Row as _SqlxRow};
use std::collections::HashMap;
use std::sync::Arc;

pub struct RelationalBackend {
    pool: MySqlPool,
    table: String,
    columns: Arc<Vec<String>>,
}

impl RelationalBackend {
    pub async fn connect(database_url: &str, table: &str, columns: Vec<String>) -> AppResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let backend = Self { pool, table: table.to_string(), columns: Arc::new(columns) };
        backend.ensure_table().await?;
        Ok(backend)
    }

    /// Reflect the table if it already exists; otherwise create it with the
    /// default three-column schema (`C1` primary key, `C2`, `C3`).
    async fn ensure_table(&self) -> AppResult<()> {
        let mut column_defs = Vec::new();
        for (i, col) in self.columns.iter().enumerate() {
            let ty = if i == 0 { "VARCHAR(255) PRIMARY KEY" } else { "VARCHAR(255)" };
            column_defs.push(format!("`{col}` {ty}"));
        }
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS `{}` ({})",
            self.table,
            column_defs.join(", ")
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    fn row_from_sqlx(&self, row: &sqlx::mysql::MySqlRow) -> AppResult<Row> {
        let mut values = Vec::with_capacity(self.columns.len());
        for col in self.columns.iter() {
            let v: String = row.try_get(col.as_str()).map_err(AppError::from)?;
            values.push(v);
        }
        Ok(Row::new(self.columns.clone(), values))
    }
}

#[async_trait]
impl Backend for RelationalBackend {
    async fn read(&self) -> AppResult<()> {
        Ok(())
    }

    async fn write(&self) -> AppResult<()> {
        Ok(())
    }

    async fn add(&self, values: Vec<String>) -> AppResult<()> {
        if values.len() != self.columns.len() {
            return Err(AppError::schema(
                "arity_mismatch",
                format!("INSERT expects {} values, got {}", self.columns.len(), values.len()),
            ));
        }
        let placeholders: Vec<&str> = self.columns.iter().map(|_| "?").collect();
        let cols: Vec<String> = self.columns.iter().map(|c| format!("`{c}`")).collect();
        let sql = format!(
            "INSERT INTO `{}` ({}) VALUES ({})",
            self.table,
            cols.join(", "),
            placeholders.join(", ")
        );
        let mut q = sqlx::query(&sql);
        for v in &values {
            q = q.bind(v.as_str());
        }
        q.execute(&self.pool).await?;
        Ok(())
    }

    async fn delete(&self, cond_map: &HashMap<String, String>) -> AppResult<usize> {
        let (clause, params) = equality_where(cond_map);
        let sql = format!("DELETE FROM `{}` WHERE {}", self.table, clause);
        let mut q = sqlx::query(&sql);
        for v in &params {
            q = q.bind(v.as_str());
        }
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn update(
        &self,
        cond_map: &HashMap<String, String>,
        target: &str,
        new_value: &str,
    ) -> AppResult<usize> {
        if !self.columns.iter().any(|c| c == target) {
            return Err(AppError::schema(
                "unknown_column",
                format!("target column '{target}' does not exist"),
            ));
        }
        let (clause, params) = equality_where(cond_map);
        let sql = format!("UPDATE `{}` SET `{}` = ? WHERE {}", self.table, target, clause);
        let mut q = sqlx::query(&sql).bind(new_value);
        for v in &params {
            q = q.bind(v.as_str());
        }
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn query(&self, conditions: &[Condition]) -> AppResult<Vec<Row>> {
        let where_clause = conditions_to_sql(conditions, &self.columns);
        let sql = match &where_clause {
            Some(w) => format!("SELECT * FROM `{}` WHERE {}", self.table, w.clause),
            None => format!("SELECT * FROM `{}`", self.table),
        };
        let mut q = sqlx::query(&sql);
        if let Some(w) = &where_clause {
            for p in &w.params {
                q = q.bind(p.as_str());
            }
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(|r| self.row_from_sqlx(r)).collect()
    }

    fn get_columns(&self) -> Vec<String> {
        self.columns.to_vec()
    }

    fn is_dirty(&self) -> bool {
        false
    }
}

/// Build a parameterized `WHERE` clause requiring equality on every
/// `(column, value)` pair — used by DELETE/UPDATE, which always select
/// rows by positional equality, never by the general query grammar.
fn equality_where(cond_map: &HashMap<String, String>) -> (String, Vec<String>) {
    if cond_map.is_empty() {
        return ("1=1".to_string(), Vec::new());
    }
    let mut clauses = Vec::with_capacity(cond_map.len());
    let mut params = Vec::with_capacity(cond_map.len());
    for (col, val) in cond_map {
        clauses.push(format!("`{col}` = ?"));
        params.push(val.clone());
    }
    (clauses.join(" AND "), params)
}
