//! In-process `CacheBackend`, used as the default and in tests where a
//! live Redis server isn't available. Implements the identical TTL/bloom/
//! lock/related-key semantics as `RedisCache` against a `parking_lot`-guarded
//! map, the same backend-duality pattern `storage::{file, relational}` uses.

use super::CacheBackend;
use crate::error::AppResult;
use async_trait::async_trait;
use growable_bloom_filter::GrowableBloom;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

struct Lock {
    token: String,
    expires_at: Instant,
}

pub struct InMemoryCache {
    values: Mutex<HashMap<String, Entry>>,
    related: Mutex<HashMap<String, HashSet<String>>>,
    locks: Mutex<HashMap<String, Lock>>,
    bloom: Mutex<GrowableBloom>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            related: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            bloom: Mutex::new(GrowableBloom::new(0.01, 1000)),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn is_live(entry: &Entry) -> bool {
    match entry.expires_at {
        Some(at) => Instant::now() < at,
        None => true,
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let mut values = self.values.lock();
        if let Some(entry) = values.get(key) {
            if is_live(entry) {
                return Ok(Some(entry.value.clone()));
            }
            values.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> AppResult<()> {
        self.values.lock().insert(
            key.to_string(),
            Entry { value: value.clone(), expires_at: ttl.map(|d| Instant::now() + d) },
        );
        Ok(())
    }

    async fn cache_null(&self, key: &str, ttl: Duration) -> AppResult<()> {
        self.set(key, &Value::Null, Some(ttl)).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.values.lock().remove(key);
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
        Ok(self
            .related
            .lock()
            .get(record_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_related_query_key(&self, record_id: &str, query_key: &str) -> AppResult<()> {
        self.related.lock().entry(record_id.to_string()).or_default().insert(query_key.to_string());
        Ok(())
    }

    async fn remove_related_query_key(&self, record_id: &str, query_key: &str) -> AppResult<()> {
        if let Some(set) = self.related.lock().get_mut(record_id) {
            set.remove(query_key);
        }
        Ok(())
    }

    async fn acquire_lock(&self, lock_key: &str, ttl: Duration) -> AppResult<Option<String>> {
        let mut locks = self.locks.lock();
        if let Some(existing) = locks.get(lock_key) {
            if Instant::now() < existing.expires_at {
                return Ok(None);
            }
        }
        let token = uuid::Uuid::new_v4().to_string();
        locks.insert(lock_key.to_string(), Lock { token: token.clone(), expires_at: Instant::now() + ttl });
        Ok(Some(token))
    }

    async fn release_lock(&self, lock_key: &str, token: &str) -> AppResult<()> {
        let mut locks = self.locks.lock();
        if let Some(existing) = locks.get(lock_key) {
            if existing.token == token {
                locks.remove(lock_key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn bloom_gates_get_for_never_set_keys() {
        let cache = InMemoryCache::new();
        assert!(!cache.in_bloom("record:missing").await.unwrap());
        assert_eq!(cache.get("record:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = InMemoryCache::new();
        cache.set("record:1", &json!({"C1": "1"}), None).await.unwrap();
        cache.add_to_bloom("record:1").await.unwrap();
        assert_eq!(cache.get("record:1").await.unwrap(), Some(json!({"C1": "1"})));
    }

    #[tokio::test]
    async fn ttl_expiry_removes_entry() {
        let cache = InMemoryCache::new();
        cache.set("k", &json!(1), Some(Duration::from_millis(5))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_lock_acquire_fails_until_released() {
        let cache = InMemoryCache::new();
        let token = cache.acquire_lock("query:x", Duration::from_secs(5)).await.unwrap().unwrap();
        assert!(cache.acquire_lock("query:x", Duration::from_secs(5)).await.unwrap().is_none());
        cache.release_lock("query:x", &token).await.unwrap();
        assert!(cache.acquire_lock("query:x", Duration::from_secs(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn related_query_keys_invalidate() {
        let cache = InMemoryCache::new();
        cache.add_related_query_key("1", "query:a").await.unwrap();
        cache.add_related_query_key("1", "query:b").await.unwrap();
        let mut keys = cache.related_query_keys("1").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["query:a".to_string(), "query:b".to_string()]);
        cache.remove_related_query_key("1", "query:a").await.unwrap();
        assert_eq!(cache.related_query_keys("1").await.unwrap(), vec!["query:b".to_string()]);
    }
}
