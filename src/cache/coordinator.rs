//! Single-flight query caching and mutation-path invalidation, grounded in
//! `mysql_manager.py`'s `query_records`/`add_record`/
//! `update_record`/`delete_record`. Sits in front of a `Backend`; never
//! used by the file backend (the Python source only wires Redis into
//! `MySQLDatabase`).

use super::{query_cache_key, record_cache_key, CacheBackend};
use crate::config::Settings;
use crate::error::AppResult;
use crate::query::{Column, Condition, Connective, Operator};
use crate::storage::{Backend, Row};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub struct CacheCoordinator {
    cache: Arc<dyn CacheBackend>,
    record_ttl: Duration,
    query_ttl: Duration,
    negative_ttl: Duration,
    lock_ttl: Duration,
    retry_backoff: Duration,
}

fn row_to_value(row: &Row) -> Value {
    Value::Object(row.as_pairs().into_iter().map(|(k, v)| (k.to_string(), Value::String(v.to_string()))).collect())
}

fn value_to_row(columns: &Arc<Vec<String>>, value: &Value) -> Row {
    let values = columns
        .iter()
        .map(|c| value.get(c).and_then(Value::as_str).unwrap_or("").to_string())
        .collect();
    Row::new(columns.clone(), values)
}

fn primary_key_column(backend: &dyn Backend) -> String {
    backend.get_columns().into_iter().next().unwrap_or_else(|| "C1".to_string())
}

fn equality_condition(column: &str, value: &str) -> Condition {
    Condition {
        column: Column::Named(column.to_string()),
        operator: Operator::Eq,
        value: value.to_string(),
        connective: Connective::End,
    }
}

impl CacheCoordinator {
    pub fn new(cache: Arc<dyn CacheBackend>, settings: &Settings) -> Self {
        Self {
            cache,
            record_ttl: settings.record_ttl,
            query_ttl: settings.query_ttl,
            negative_ttl: settings.negative_ttl,
            lock_ttl: settings.lock_ttl,
            retry_backoff: settings.retry_backoff,
        }
    }

    /// Resolve a query: cache hit on the record-id list resolves each id
    /// individually (with its own single-flight fallback); a cache miss
    /// single-flights the whole query against the backend.
    pub fn query<'a>(
        &'a self,
        backend: &'a dyn Backend,
        query_str: &'a str,
        conditions: &'a [Condition],
    ) -> Pin<Box<dyn Future<Output = AppResult<Vec<Row>>> + Send + 'a>> {
        Box::pin(async move {
            let columns = Arc::new(backend.get_columns());
            let pk = primary_key_column(backend);
            let query_key = query_cache_key(query_str);

            if let Some(cached_ids) = self.cache.get(&query_key).await? {
                return self.resolve_ids(backend, &columns, &pk, &cached_ids).await;
            }

            let Some(token) = self.cache.acquire_lock(&query_key, self.lock_ttl).await? else {
                tokio::time::sleep(self.retry_backoff).await;
                return self.query(backend, query_str, conditions).await;
            };

            // double-checked locking: another writer may have populated the
            // cache while we were waiting for the lock.
            if let Some(cached_ids) = self.cache.get(&query_key).await? {
                self.cache.release_lock(&query_key, &token).await?;
                return self.resolve_ids(backend, &columns, &pk, &cached_ids).await;
            }

            let rows = backend.query(conditions).await?;
            let ids: Vec<String> =
                rows.iter().map(|r| r.get(&pk).cloned().unwrap_or_default()).collect();
            self.cache
                .set(&query_key, &Value::Array(ids.iter().cloned().map(Value::String).collect()), Some(self.query_ttl))
                .await?;
            for (row, id) in rows.iter().zip(ids.iter()) {
                let record_key = record_cache_key(id);
                self.cache.set(&record_key, &row_to_value(row), Some(self.record_ttl)).await?;
                self.cache.add_to_bloom(&record_key).await?;
                self.cache.add_related_query_key(id, &query_key).await?;
            }
            self.cache.release_lock(&query_key, &token).await?;
            Ok(rows)
        })
    }

    fn resolve_ids<'a>(
        &'a self,
        backend: &'a dyn Backend,
        columns: &'a Arc<Vec<String>>,
        pk: &'a str,
        cached_ids: &'a Value,
    ) -> Pin<Box<dyn Future<Output = AppResult<Vec<Row>>> + Send + 'a>> {
        Box::pin(async move {
            let ids: Vec<String> = cached_ids
                .as_array()
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();

            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                let record_key = record_cache_key(&id);
                if !self.cache.in_bloom(&record_key).await? {
                    continue;
                }
                match self.cache.get(&record_key).await? {
                    Some(v) if !v.is_null() => results.push(value_to_row(columns, &v)),
                    Some(_) => {}
                    None => {
                        if let Some(token) = self.cache.acquire_lock(&record_key, self.lock_ttl).await? {
                            let loaded = backend.query(&[equality_condition(pk, &id)]).await?;
                            match loaded.into_iter().next() {
                                Some(row) => {
                                    self.cache.set(&record_key, &row_to_value(&row), Some(self.record_ttl)).await?;
                                    results.push(row);
                                }
                                None => self.cache.cache_null(&record_key, self.negative_ttl).await?,
                            }
                            self.cache.release_lock(&record_key, &token).await?;
                        } else {
                            tokio::time::sleep(self.retry_backoff).await;
                            if let Some(v) = self.cache.get(&record_key).await? {
                                if !v.is_null() {
                                    results.push(value_to_row(columns, &v));
                                }
                            }
                        }
                    }
                }
            }
            Ok(results)
        })
    }

    /// Refresh (or clear) one record's cache entry and drop every cached
    /// query result that depended on it, mirroring `add_record`/
    /// `update_record`/`delete_record`'s `_invalidate_related_query_cache`.
    pub async fn on_mutation(&self, backend: &dyn Backend, record_id: &str) -> AppResult<()> {
        let pk = primary_key_column(backend);
        let record_key = record_cache_key(record_id);
        let rows = backend.query(&[equality_condition(&pk, record_id)]).await?;
        match rows.into_iter().next() {
            Some(row) => {
                self.cache.set(&record_key, &row_to_value(&row), Some(self.record_ttl)).await?;
                self.cache.add_to_bloom(&record_key).await?;
            }
            None => self.cache.delete(&record_key).await?,
        }
        self.invalidate_related(record_id).await
    }

    async fn invalidate_related(&self, record_id: &str) -> AppResult<()> {
        for query_key in self.cache.related_query_keys(record_id).await? {
            self.cache.delete(&query_key).await?;
            self.cache.remove_related_query_key(record_id, &query_key).await?;
        }
        Ok(())
    }
}
