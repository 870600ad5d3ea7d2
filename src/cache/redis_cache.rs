//! Redis-backed `CacheBackend`, the Rust analogue of
//! `redis_manager.py`'s `RedisManager` against a real Redis server. The
//! bloom filter stays in-process (as it does in the Python source — it's a
//! local object the manager owns, not data stored in Redis); everything
//! else round-trips through `redis`'s async connection manager.

use super::CacheBackend;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use growable_bloom_filter::GrowableBloom;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::time::Duration;

pub struct RedisCache {
    conn: ConnectionManager,
    bloom: Mutex<GrowableBloom>,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::cache("redis_connect", e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| AppError::cache("redis_connect", e.to_string()))?;
        Ok(Self { conn, bloom: Mutex::new(GrowableBloom::new(0.01, 1000)) })
    }
}

fn cache_err(e: redis::RedisError) -> AppError {
    AppError::cache("redis_error", e.to_string())
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(cache_err)?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s).map_err(|e| AppError::cache("bad_json", e.to_string()))?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let serialized = serde_json::to_string(value).map_err(|e| AppError::cache("bad_json", e.to_string()))?;
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, serialized, ttl.as_secs().max(1)).await.map_err(cache_err)?;
            }
            None => {
                let _: () = conn.set(key, serialized).await.map_err(cache_err)?;
            }
        }
        Ok(())
    }

    async fn cache_null(&self, key: &str, ttl: Duration) -> AppResult<()> {
        self.set(key, &Value::Null, Some(ttl)).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(cache_err)?;
        Ok(())
    }

    async fn add_to_bloom(&self, key: &str) -> AppResult<()> {
        self.bloom.lock().insert(key);
        Ok(())
    }

    async fn in_bloom(&self, key: &str) -> AppResult<bool> {
        Ok(self.bloom.lock().contains(key))
    }

    async fn related_query_keys(&self, record_id: &str) -> AppResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let key = super::related_queries_key(record_id);
        let members: Vec<String> = conn.smembers(key).await.map_err(cache_err)?;
        Ok(members)
    }

    async fn add_related_query_key(&self, record_id: &str, query_key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = super::related_queries_key(record_id);
        let _: () = conn.sadd(key, query_key).await.map_err(cache_err)?;
        Ok(())
    }

    async fn remove_related_query_key(&self, record_id: &str, query_key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = super::related_queries_key(record_id);
        let _: () = conn.srem(key, query_key).await.map_err(cache_err)?;
        Ok(())
    }

    /// `SET key token NX PX ttl`: the single-node equivalent of Redlock's
    /// acquire against one master.
    async fn acquire_lock(&self, lock_key: &str, ttl: Duration) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let token = uuid::Uuid::new_v4().to_string();
        let acquired: bool = redis::cmd("SET")
            .arg(lock_key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;
        Ok(if acquired { Some(token) } else { None })
    }

    /// Best-effort check-then-delete. Not a single atomic Lua script, so a
    /// lock could in principle expire and be re-acquired by another holder
    /// between the `GET` and the `DEL` — acceptable here because the lock
    /// only guards a cache-population race, never data integrity (the
    /// backend write path is authoritative either way).
    async fn release_lock(&self, lock_key: &str, token: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let current: Option<String> = conn.get(lock_key).await.map_err(cache_err)?;
        if current.as_deref() == Some(token) {
            let _: () = conn.del(lock_key).await.map_err(cache_err)?;
        }
        Ok(())
    }
}
