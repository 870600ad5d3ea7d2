//! Task queue abstraction, grounded in
//! `examples/original_source/threading_lib/task_queue.py`'s
//! `QueueInterface`/`LocalQueue`/`RabbitMQQueue`.
//!
//! `LocalQueue::get` blocks (via `spawn_blocking`, off the async executor)
//! until at least one command is available, then drains up to `max`
//! additional items without blocking further — a Rust-idiomatic
//! reconciliation of the Python source's inconsistency, where
//! `LocalQueue.get()` ignores the `batch_size` argument the call site
//! passes it and always returns exactly one item.

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// One dequeued item: either a mutation command body, or the close
/// sentinel (`LocalQueue::close`'s `put(None)` in the Python source).
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Command(String),
    Close,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn put(&self, command: String) -> AppResult<()>;
    /// Block until at least one item is available, then return up to `max`
    /// items without blocking further.
    async fn get(&self, max: usize) -> AppResult<Vec<QueueItem>>;
    async fn close(&self) -> AppResult<()>;
}

pub struct LocalQueue {
    state: Arc<(Mutex<VecDeque<QueueItem>>, Condvar)>,
}

impl LocalQueue {
    pub fn new() -> Self {
        Self { state: Arc::new((Mutex::new(VecDeque::new()), Condvar::new())) }
    }

    fn blocking_get(state: Arc<(Mutex<VecDeque<QueueItem>>, Condvar)>, max: usize) -> Vec<QueueItem> {
        let (lock, cvar) = &*state;
        let mut queue = lock.lock().unwrap();
        while queue.is_empty() {
            queue = cvar.wait(queue).unwrap();
        }
        let mut out = Vec::with_capacity(max.max(1));
        while let Some(item) = queue.pop_front() {
            out.push(item);
            if out.len() >= max {
                break;
            }
        }
        out
    }
}

impl Default for LocalQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for LocalQueue {
    async fn put(&self, command: String) -> AppResult<()> {
        let (lock, cvar) = &*self.state;
        lock.lock().unwrap().push_back(QueueItem::Command(command));
        cvar.notify_one();
        Ok(())
    }

    async fn get(&self, max: usize) -> AppResult<Vec<QueueItem>> {
        let state = self.state.clone();
        let max = max.max(1);
        tokio::task::spawn_blocking(move || Self::blocking_get(state, max))
            .await
            .map_err(|e| AppError::internal("queue_join", e.to_string()))
    }

    async fn close(&self) -> AppResult<()> {
        let (lock, cvar) = &*self.state;
        lock.lock().unwrap().push_back(QueueItem::Close);
        cvar.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let q = LocalQueue::new();
        q.put("INSERT \"1\"".into()).await.unwrap();
        let items = q.get(10).await.unwrap();
        assert_eq!(items, vec![QueueItem::Command("INSERT \"1\"".into())]);
    }

    #[tokio::test]
    async fn get_drains_up_to_max_without_blocking_further() {
        let q = LocalQueue::new();
        for i in 0..5 {
            q.put(format!("cmd{i}")).await.unwrap();
        }
        let items = q.get(3).await.unwrap();
        assert_eq!(items.len(), 3);
        let rest = q.get(10).await.unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[tokio::test]
    async fn close_enqueues_sentinel() {
        let q = LocalQueue::new();
        q.put("cmd".into()).await.unwrap();
        q.close().await.unwrap();
        let items = q.get(10).await.unwrap();
        assert_eq!(items, vec![QueueItem::Command("cmd".into()), QueueItem::Close]);
    }

    #[tokio::test]
    async fn get_blocks_until_an_item_arrives() {
        let q = Arc::new(LocalQueue::new());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.get(1).await.unwrap() });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        q.put("late".into()).await.unwrap();
        let items = handle.await.unwrap();
        assert_eq!(items, vec![QueueItem::Command("late".into())]);
    }
}
