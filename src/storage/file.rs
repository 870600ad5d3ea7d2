//! CSV file backend, grounded in
//! `examples/original_source/database/csv_file_manager.py`'s semantics and
//! written atomically (temp file + rename) in the style of `clarium`'s
//! on-disk writers.

use super::{positional_condition_map, Backend, Row, Table};
use crate::error::{AppError, AppResult};
use crate::query::Condition;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct FileBackend {
    path: PathBuf,
    table: Mutex<Table>,
}

impl FileBackend {
    /// Open (or prepare to create) a CSV file with the given header row.
    /// The file itself is not touched until `read`/`write` are called.
    pub fn new(path: impl Into<PathBuf>, columns: Vec<String>) -> Self {
        Self { path: path.into(), table: Mutex::new(Table::new(columns)) }
    }

    fn load(path: &Path, columns: &[String]) -> AppResult<Table> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "table file missing, starting empty");
            return Ok(Table::new(columns.to_vec()));
        }
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let header: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
        if header != columns {
            return Err(AppError::schema(
                "column_mismatch",
                format!("{} header is {:?}, expected {:?}", path.display(), header, columns),
            ));
        }
        let mut table = Table::new(columns.to_vec());
        for record in reader.records() {
            let record = record?;
            let values: Vec<String> = record.iter().map(|s| s.to_string()).collect();
            table.add_row(values)?;
        }
        table.dirty = false;
        Ok(table)
    }

    fn persist(path: &Path, table: &Table) -> AppResult<()> {
        let tmp_path = path.with_extension("csv.tmp");
        {
            let mut writer = csv::WriterBuilder::new().from_path(&tmp_path)?;
            writer.write_record(table.columns.iter())?;
            for row in &table.rows {
                writer.write_record(row.as_pairs().into_iter().map(|(_, v)| v))?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn read(&self) -> AppResult<()> {
        let columns = self.table.lock().columns.to_vec();
        let loaded = Self::load(&self.path, &columns)?;
        *self.table.lock() = loaded;
        Ok(())
    }

    async fn write(&self) -> AppResult<()> {
        let mut guard = self.table.lock();
        if !guard.dirty {
            return Ok(());
        }
        Self::persist(&self.path, &guard)?;
        guard.dirty = false;
        Ok(())
    }

    async fn add(&self, values: Vec<String>) -> AppResult<()> {
        self.table.lock().add_row(values)
    }

    async fn delete(&self, cond_map: &HashMap<String, String>) -> AppResult<usize> {
        Ok(self.table.lock().delete_where(cond_map))
    }

    async fn update(
        &self,
        cond_map: &HashMap<String, String>,
        target: &str,
        new_value: &str,
    ) -> AppResult<usize> {
        self.table.lock().update_where(cond_map, target, new_value)
    }

    async fn query(&self, conditions: &[Condition]) -> AppResult<Vec<Row>> {
        Ok(self.table.lock().query(conditions))
    }

    fn get_columns(&self) -> Vec<String> {
        self.table.lock().columns.to_vec()
    }

    fn is_dirty(&self) -> bool {
        self.table.lock().dirty
    }
}

/// Build the positional equality map DELETE/UPDATE commands use, given the
/// backend's canonical columns.
pub fn condition_map_for(backend: &dyn Backend, values: &[String]) -> HashMap<String, String> {
    positional_condition_map(&backend.get_columns(), values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<String> {
        vec!["C1".into(), "C2".into(), "C3".into()]
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");

        let backend = FileBackend::new(&path, cols());
        backend.read().await.unwrap();
        backend.add(vec!["1".into(), "a".into(), "x".into()]).await.unwrap();
        backend.add(vec!["2".into(), "b".into(), "y".into()]).await.unwrap();
        backend.write().await.unwrap();
        assert!(!backend.is_dirty());

        let reloaded = FileBackend::new(&path, cols());
        reloaded.read().await.unwrap();
        let rows = reloaded.query(&[]).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        let backend = FileBackend::new(&path, cols());
        backend.read().await.unwrap();
        assert_eq!(backend.query(&[]).await.unwrap().len(), 0);
        assert!(!backend.is_dirty());
    }

    #[tokio::test]
    async fn insert_update_delete_round_trip_clears_dirty_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let backend = FileBackend::new(&path, cols());
        backend.read().await.unwrap();

        backend.add(vec!["1".into(), "a".into(), "x".into()]).await.unwrap();
        let map = condition_map_for(&backend, &["1".to_string()]);
        backend.update(&map, "C2", "changed").await.unwrap();
        backend.delete(&map).await.unwrap();
        assert!(backend.is_dirty());

        backend.write().await.unwrap();
        assert!(!backend.is_dirty());
        assert_eq!(backend.query(&[]).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn add_with_wrong_arity_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let backend = FileBackend::new(&path, cols());
        backend.read().await.unwrap();
        let err = backend.add(vec!["only one".into()]).await.unwrap_err();
        assert_eq!(err.code_str(), "arity_mismatch");
    }
}
