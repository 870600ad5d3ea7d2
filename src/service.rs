//! Service core: composes the fair read/write lock, task queue, storage
//! backend, and optional cache coordinator into the read/write entry
//! points the HTTP layer calls — the Rust shape of
//! `examples/original_source/main.py`'s `CSVDatabase` /
//! `business_logic.py`'s `BusinessLogic` facade.

use crate::cache::CacheCoordinator;
use crate::command::{parse_command, MutationCommand};
use crate::concurrency::{spawn_batch_consumer, FairRwLock, TaskQueue};
use crate::config::Settings;
use crate::error::AppResult;
use crate::query::{parse_query, Column, Condition, Connective, Operator};
use crate::storage::{positional_condition_map, Backend, Row};
use std::collections::HashMap;
use std::sync::Arc;

pub struct ServiceCore {
    lock: FairRwLock,
    queue: Arc<dyn TaskQueue>,
    backend: Arc<dyn Backend>,
    cache: Option<Arc<CacheCoordinator>>,
}

impl ServiceCore {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        backend: Arc<dyn Backend>,
        cache: Option<Arc<CacheCoordinator>>,
        settings: &Settings,
    ) -> Self {
        let lock = FairRwLock::new();
        spawn_batch_consumer(
            queue.clone(),
            lock.clone(),
            backend.clone(),
            cache.clone(),
            settings.batch_size,
            settings.delay,
        );
        Self { lock, queue, backend, cache }
    }

    /// Parse and evaluate a query string under a read permit, consulting
    /// the cache coordinator when one is configured.
    pub async fn query_data(&self, query_str: &str) -> AppResult<Vec<Row>> {
        let conditions = parse_query(query_str)?;
        let _read_guard = self.lock.read();
        match &self.cache {
            Some(cache) => cache.query(self.backend.as_ref(), query_str, &conditions).await,
            None => self.backend.query(&conditions).await,
        }
    }

    /// Enqueue a mutation command for the batch consumer; returns as soon
    /// as the command is durably queued, not once it's applied.
    pub async fn modify_data(&self, command: String) -> AppResult<()> {
        self.queue.put(command).await
    }

    pub async fn shutdown(&self) -> AppResult<()> {
        self.queue.close().await
    }

    /// The backend's canonical column list, used by the HTTP layer to
    /// validate a mutation command's arity/target column before enqueueing.
    pub fn columns(&self) -> Vec<String> {
        self.backend.get_columns()
    }
}

/// Apply one already-dequeued mutation command to `backend`, refreshing
/// `cache` for every record the mutation touched. Called by the batch
/// consumer under the write lock; a parse or schema error here is the
/// caller's responsibility to log and skip, not to propagate.
pub async fn apply_mutation(
    backend: &dyn Backend,
    cache: Option<&CacheCoordinator>,
    raw: &str,
) -> AppResult<()> {
    let columns = backend.get_columns();
    let command = parse_command(raw, &columns)?;

    match command {
        MutationCommand::Insert(values) => {
            let record_id = values.first().cloned().unwrap_or_default();
            backend.add(values).await?;
            if let Some(cache) = cache {
                cache.on_mutation(backend, &record_id).await?;
            }
        }
        MutationCommand::Delete(condition_values) => {
            let cond_map = positional_condition_map(&columns, &condition_values);
            let affected = matching_record_ids(backend, &columns, &cond_map).await?;
            backend.delete(&cond_map).await?;
            if let Some(cache) = cache {
                for id in affected {
                    cache.on_mutation(backend, &id).await?;
                }
            }
        }
        MutationCommand::Update { condition_values, target_column, new_value } => {
            let cond_map = positional_condition_map(&columns, &condition_values);
            let affected = matching_record_ids(backend, &columns, &cond_map).await?;
            backend.update(&cond_map, &target_column, &new_value).await?;
            if let Some(cache) = cache {
                for id in affected {
                    cache.on_mutation(backend, &id).await?;
                }
            }
        }
    }
    Ok(())
}

/// The primary-key values of every row currently matching `cond_map`,
/// captured before a DELETE/UPDATE runs so the cache can be invalidated
/// per affected record afterward — mirroring `mysql_manager.py`'s
/// `records = query.all()` read-before-write.
async fn matching_record_ids(
    backend: &dyn Backend,
    columns: &[String],
    cond_map: &HashMap<String, String>,
) -> AppResult<Vec<String>> {
    let pk = columns.first().cloned().unwrap_or_else(|| "C1".to_string());
    let mut conditions: Vec<Condition> = cond_map
        .iter()
        .map(|(col, val)| Condition {
            column: Column::Named(col.clone()),
            operator: Operator::Eq,
            value: val.clone(),
            connective: Connective::And,
        })
        .collect();
    if let Some(last) = conditions.last_mut() {
        last.connective = Connective::End;
    }
    let rows = backend.query(&conditions).await?;
    Ok(rows.iter().filter_map(|r| r.get(&pk).cloned()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::FileBackend;

    fn cols() -> Vec<String> {
        vec!["C1".into(), "C2".into(), "C3".into()]
    }

    #[tokio::test]
    async fn apply_mutation_insert_update_delete_leaves_table_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("t.csv"), cols());
        backend.read().await.unwrap();

        apply_mutation(&backend, None, r#"INSERT "1","a","x""#).await.unwrap();
        apply_mutation(&backend, None, r#"UPDATE "1" C2 "changed""#).await.unwrap();
        apply_mutation(&backend, None, r#"DELETE "1""#).await.unwrap();

        assert!(backend.is_dirty());
        backend.write().await.unwrap();
        assert!(!backend.is_dirty());
        assert_eq!(backend.query(&[]).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn apply_mutation_with_bad_arity_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("t.csv"), cols());
        backend.read().await.unwrap();
        let err = apply_mutation(&backend, None, r#"INSERT "only one""#).await.unwrap_err();
        assert_eq!(err.code_str(), "arity_mismatch");
    }
}
