//! Cache layer, grounded in
//! `examples/original_source/database/redis_manager.py`'s `RedisManager`
//! and the single-flight query path in `database/mysql_manager.py`'s
//! `query_records`/`add_record`/`update_record`/`delete_record`.
//!
//! `CacheBackend` is an injected-collaborator surface: the relational
//! backend never talks to Redis directly, a `CacheCoordinator` sits
//! between it and the service and owns the single-flight/invalidation
//! protocol.

pub mod coordinator;
pub mod memory;
pub mod redis_cache;

pub use coordinator::CacheCoordinator;
pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;

use crate::error::AppResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub fn record_cache_key(record_id: &str) -> String {
    format!("record:{record_id}")
}

pub fn query_cache_key(query: &str) -> String {
    format!("query:{query}")
}

pub fn related_queries_key(record_id: &str) -> String {
    format!("record_queries:{record_id}")
}

/// The distributed KV/lock/bloom-filter surface `RedisManager` exposes,
/// with the bloom filter and locking folded in as first-class operations
/// rather than a separate object, since every implementation needs both.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<Value>>;
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> AppResult<()>;
    async fn cache_null(&self, key: &str, ttl: Duration) -> AppResult<()>;
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Add a key to the membership filter. Called whenever a record is
    /// cached, never when it's merely read.
    async fn add_to_bloom(&self, key: &str) -> AppResult<()>;
    /// `false` means the key was never cached — skip the round-trip.
    async fn in_bloom(&self, key: &str) -> AppResult<bool>;

    async fn related_query_keys(&self, record_id: &str) -> AppResult<Vec<String>>;
    async fn add_related_query_key(&self, record_id: &str, query_key: &str) -> AppResult<()>;
    async fn remove_related_query_key(&self, record_id: &str, query_key: &str) -> AppResult<()>;

    /// Acquire a TTL'd distributed lock, returning a release token on
    /// success. Returns `Ok(None)` (not an error) on contention — callers
    /// retry after a backoff, matching `mysql_manager.py`'s
    /// `time.sleep(0.1)` fallback.
    async fn acquire_lock(&self, lock_key: &str, ttl: Duration) -> AppResult<Option<String>>;
    async fn release_lock(&self, lock_key: &str, token: &str) -> AppResult<()>;
}
